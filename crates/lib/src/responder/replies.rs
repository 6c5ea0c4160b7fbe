//! Fixed assistant strings (Portuguese). Kept verbatim; hosts and snapshot tests compare them exactly.

pub const GREETING: &str =
    "Olá! Sou a IA da Agência Marka. Como posso ajudar a alavancar seu negócio hoje?";

pub const PRICING: &str = "Nossos projetos são personalizados. Para um orçamento exato, preciso entender sua necessidade. Posso te chamar no WhatsApp?";

pub const SERVICES: &str =
    "Oferecemos Tráfego Pago, Social Media e Criação de Sites. Qual desses você busca hoje?";

pub const CONTACT: &str = "Você pode falar diretamente com o Barreto pelo WhatsApp no link abaixo ou pelo (51) 98468-7497.";

pub const GRATITUDE: &str = "Fico muito feliz em poder ajudar! 🖤 A equipe da Agência Marka agradece o seu contato. Estamos prontos para transformar o seu negócio. Até breve! 🚀";

pub const FALLBACK: &str = "Entendi! Para te dar uma resposta mais detalhada, recomendo falar com nosso especialista no WhatsApp. Clique no botão amarelo ao lado!";

pub const PHONE_DETECTED: &str = "Perfeito! Identifiquei seu número. Para agilizar, clique no botão abaixo para enviar esse contato diretamente para nossa equipe no WhatsApp.";

pub const WHATSAPP_ACTION_LABEL: &str = "Confirmar Envio no WhatsApp";

/// Replies used by the Gemini-backed responder when the model cannot answer.
pub const AI_OFFLINE: &str = "Sistemas offline. (API Key ausente)";
pub const AI_EMPTY: &str = "Transmissão interrompida.";
pub const AI_FAILED: &str = "Sinal perdido. Tente novamente mais tarde.";
