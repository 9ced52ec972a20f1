//! WhatsApp deep link shown at the end of the funnel, pre-filled with the
//! lead's answers.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::script::fill_placeholders;
use super::state::AnswerMap;

/// Characters `encodeURIComponent` leaves untouched besides alphanumerics.
/// The deep-link parser on the other side expects exactly this encoding.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const WHATSAPP_SEND_URL: &str = "https://api.whatsapp.com/send";

/// Answer keys substituted into the link template.
pub const SUMMARY_FIELDS: [&str; 5] = [
    "name",
    "objective",
    "investor_status",
    "property_type",
    "budget",
];

/// Default pre-filled message.
pub const DEFAULT_TEMPLATE: &str = "Olá, vim pelo Chat do Site! Gostaria de agendar uma reunião.\n\n*Meus Dados:*\n👤 Nome: {name}\n🏠 Objetivo: {objective}\n📈 Investidor: {investor_status}\n🏢 Tipo: {property_type}\n💰 Budget: {budget}";

/// Where the terminal link points and what it says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Destination phone number, in any human format.
    pub destination_number: String,
    /// Message template with `{field}` placeholders.
    pub template: String,
}

impl LinkConfig {
    pub fn new(destination_number: impl Into<String>) -> Self {
        Self {
            destination_number: destination_number.into(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Keep only ASCII digits.
pub fn digits_only(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Percent-encode like ECMAScript `encodeURIComponent`.
pub fn encode_uri_component(text: &str) -> String {
    utf8_percent_encode(text, URI_COMPONENT).to_string()
}

/// Build `https://api.whatsapp.com/send?phone=<digits>&text=<encoded>`.
///
/// Missing answers are substituted as empty strings.
pub fn build_terminal_link(answers: &AnswerMap, destination_number: &str, template: &str) -> String {
    let body = fill_placeholders(
        template,
        SUMMARY_FIELDS
            .iter()
            .map(|field| (*field, answers.get(field).unwrap_or_default())),
    );
    format!(
        "{WHATSAPP_SEND_URL}?phone={}&text={}",
        digits_only(destination_number),
        encode_uri_component(&body)
    )
}
