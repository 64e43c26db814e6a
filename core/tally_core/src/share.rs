use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;

/// Where a report is sent.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Destination {
    /// Phone number in any notation; only the digits are kept.
    Number(String),
    /// Pre-shared group invite link. The text travels separately (clipboard).
    Group(String),
}

/// Monospace block so the column layout survives the chat client.
pub fn wrap_code_fence(text: &str) -> String {
    format!("```\n{}\n```", text.trim_end())
}

pub fn share_link(report_text: &str, dest: &Destination) -> String {
    match dest {
        Destination::Number(number) => {
            let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
            let fenced = wrap_code_fence(report_text);
            format!(
                "https://wa.me/{digits}?text={}",
                utf8_percent_encode(&fenced, NON_ALPHANUMERIC)
            )
        }
        Destination::Group(url) => url.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_link_is_fenced_and_encoded() {
        let url = share_link("*MV X*\nFWD  1\n", &Destination::Number("+27 82-555 0101".into()));
        assert_eq!(
            url,
            "https://wa.me/27825550101?text=%60%60%60%0A%2AMV%20X%2A%0AFWD%20%201%0A%60%60%60"
        );
    }

    #[test]
    fn group_link_is_passed_through() {
        let dest = Destination::Group(" https://chat.whatsapp.com/AbC123 ".into());
        assert_eq!(share_link("ignored", &dest), "https://chat.whatsapp.com/AbC123");
    }
}
