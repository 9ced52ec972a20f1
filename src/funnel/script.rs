//! Script definition, the ordered and immutable list of funnel steps.
//!
//! A script is validated once when it is built and never mutated afterwards.
//! Steps never branch: choices only change how the input is rendered, not
//! which step comes next.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ScriptError};
use crate::integrations::lead::RESERVED_LEAD_FIELDS;

use super::state::AnswerMap;

/// How the user answers a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputKind {
    FreeText,
    SingleChoice { choices: Vec<String> },
    TerminalLink { label: String },
}

impl InputKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TerminalLink { .. })
    }
}

/// The agent text for a step.
///
/// Interpolated prompts name the answers they consume in `requires`; only
/// those answers are handed to the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Static(String),
    Interpolated {
        template: String,
        requires: Vec<String>,
    },
}

impl Prompt {
    /// Answer keys this prompt needs.
    pub fn requires(&self) -> &[String] {
        match self {
            Self::Static(_) => &[],
            Self::Interpolated { requires, .. } => requires,
        }
    }

    /// Render the prompt. `inputs` should hold exactly the required answers.
    pub fn resolve(&self, inputs: &AnswerMap) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Interpolated { template, requires } => fill_placeholders(
                template,
                requires
                    .iter()
                    .map(|key| (key.as_str(), inputs.get(key).unwrap_or_default())),
            ),
        }
    }
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"));

/// Replace each `{key}` in `template` with its value in a single pass.
///
/// Substituted values are never scanned again, so answers containing
/// `{...}` come out verbatim. Placeholders without a value are left as-is.
pub fn fill_placeholders<'a>(
    template: &str,
    values: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let values: Vec<(&str, &str)> = values.into_iter().collect();
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            match values.iter().find(|(key, _)| *key == &caps[1]) {
                Some((_, value)) => (*value).to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// One entry of the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Answer-map key for the user's response to this step.
    pub key: String,
    pub prompt: Prompt,
    pub input: InputKind,
    /// Pre-recorded audio played instead of the text. The text stays as the
    /// accessibility fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
}

impl Step {
    pub fn new(key: impl Into<String>, prompt: Prompt, input: InputKind) -> Self {
        Self {
            key: key.into(),
            prompt,
            input,
            audio_ref: None,
        }
    }

    pub fn with_audio(mut self, audio_ref: impl Into<String>) -> Self {
        self.audio_ref = Some(audio_ref.into());
        self
    }
}

/// Who the user believes they are talking to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub typing_label: String,
    pub banner: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Theodoro - Statux Realty".to_string(),
            typing_label: "digitando...".to_string(),
            banner: "🔒 As mensagens são protegidas com a criptografia de ponta a ponta."
                .to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ScriptFile {
    #[serde(default)]
    persona: Option<Persona>,
    steps: Vec<Step>,
}

/// A validated, immutable funnel script.
#[derive(Debug, Clone)]
pub struct Script {
    steps: Vec<Step>,
    persona: Persona,
}

impl Script {
    /// Validate and wrap a list of steps.
    pub fn new(steps: Vec<Step>) -> Result<Self, ScriptError> {
        validate(&steps)?;
        Ok(Self {
            steps,
            persona: Persona::default(),
        })
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    /// Parse a script from JSON: `{"persona": {...}, "steps": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        let file: ScriptFile =
            serde_json::from_str(json).map_err(|e| ScriptError::Parse(e.to_string()))?;
        let script = Self::new(file.steps)?;
        Ok(match file.persona {
            Some(persona) => script.with_persona(persona),
            None => script,
        })
    }

    /// Load a script from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::ScriptLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json).map_err(|e| ConfigError::ScriptLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// The Statux Realty qualification funnel.
    pub fn reference() -> Self {
        let steps = vec![
            Step::new(
                "name",
                Prompt::Static(
                    "Olá, tudo bem? 👋\n\nAqui é o Theodoro, gestor de investimentos imobiliários da Statux Realty! 🏢✨\n\nPra gente começar, me conta: qual é o seu nome?\nAssim já salvo seu contato aqui pra gente conversar melhor! 📲👇"
                        .to_string(),
                ),
                InputKind::FreeText,
            ),
            Step::new(
                "objective",
                Prompt::Interpolated {
                    template: "Prazer, {name}! Você está buscando imóvel para moradia ou para investimento?"
                        .to_string(),
                    requires: vec!["name".to_string()],
                },
                choices(&["Moradia", "Investimento"]),
            ),
            Step::new(
                "investor_status",
                Prompt::Static("Você já investiu no mercado ou seria o seu primeiro?".to_string()),
                choices(&["Sim, sou investidor", "Não, esse seria o meu primeiro"]),
            ),
            Step::new(
                "property_type",
                Prompt::Static("O seu interesse seria em imóveis Lançamento ou Pronto?".to_string()),
                choices(&["Lançamento", "Pronto"]),
            ),
            Step::new(
                "budget",
                Prompt::Static("Qual Budget você está buscando investir?".to_string()),
                choices(&[
                    "De R$ 350mil a R$ 400mil",
                    "De R$ 450 a R$ 550mil",
                    "De R$ 650mil +",
                ]),
            ),
            Step::new(
                "final",
                Prompt::Static(
                    "Perfeito! Selecionei algumas oportunidades exclusivas para o seu perfil. Clique abaixo para falar agora com nosso gerente:"
                        .to_string(),
                ),
                InputKind::TerminalLink {
                    label: "Agendar agora reunião com o gerente".to_string(),
                },
            ),
        ];
        Self {
            steps,
            persona: Persona::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }
}

fn choices(labels: &[&str]) -> InputKind {
    InputKind::SingleChoice {
        choices: labels.iter().map(|s| s.to_string()).collect(),
    }
}

fn validate(steps: &[Step]) -> Result<(), ScriptError> {
    let last = steps.last().ok_or(ScriptError::Empty)?;
    if !last.input.is_terminal() {
        return Err(ScriptError::MissingTerminal {
            key: last.key.clone(),
        });
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for (index, step) in steps.iter().enumerate() {
        if step.key.trim().is_empty() {
            return Err(ScriptError::EmptyKey { index });
        }
        if RESERVED_LEAD_FIELDS.contains(&step.key.as_str()) {
            return Err(ScriptError::ReservedKey {
                key: step.key.clone(),
            });
        }
        // Interpolation may only look backwards.
        if let Some(missing) = step
            .prompt
            .requires()
            .iter()
            .find(|key| !seen.contains(key.as_str()))
        {
            return Err(ScriptError::UnresolvableInterpolation {
                key: step.key.clone(),
                requires: missing.clone(),
            });
        }
        if !seen.insert(step.key.as_str()) {
            return Err(ScriptError::DuplicateKey {
                key: step.key.clone(),
            });
        }
        match &step.input {
            InputKind::SingleChoice { choices } if choices.is_empty() => {
                return Err(ScriptError::NoChoices {
                    key: step.key.clone(),
                });
            }
            InputKind::TerminalLink { .. } if index + 1 != steps.len() => {
                return Err(ScriptError::EarlyTerminal {
                    key: step.key.clone(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}
