//! WhatsApp deep link to the agency number, pre-filled with a message.

/// Agency number in international format, as wa.me expects it.
pub const AGENCY_NUMBER: &str = "5551984687497";

/// Text the visitor sends to the agency once they confirm. The number is kept verbatim.
pub fn handoff_message(number: &str) -> String {
    format!("Olá, deixei meu contato {number} no chat do site. Aguardo retorno.")
}

/// `https://wa.me/<agency>?text=<url-encoded message>`.
pub fn deep_link(message: &str) -> String {
    format!(
        "https://wa.me/{}?text={}",
        AGENCY_NUMBER,
        urlencoding::encode(message)
    )
}
