//! User-facing chat prompts.
//!
//! Everything the bot says lives here so the engine stays wording-free.
//! The audience is Peruvian, so the copy is Spanish.

use crate::dispatch::DispatchReport;
use crate::phone::PhoneNumber;

use super::keywords::{CANCEL_KEYWORD, SEND_TRIGGER, START_KEYWORD};

/// How many numbers the accumulation report previews.
const PREVIEW_LIMIT: usize = 10;

/// Queue echoes truncate each body to this many characters.
const ECHO_LIMIT: usize = 50;

pub fn welcome() -> String {
    format!(
        "✅ Acceso concedido. Escribe *{START_KEYWORD}* para iniciar una difusión \
         o *{CANCEL_KEYWORD}* para salir."
    )
}

pub fn idle_hint() -> String {
    format!("Escribe *{START_KEYWORD}* para iniciar una difusión.")
}

pub fn ask_numbers() -> String {
    "Envíame los números de los destinatarios: escríbelos separados por comas o \
     saltos de línea, o sube un archivo CSV/TXT. Cuando termines escribe *confirmar*."
        .to_string()
}

/// Accumulation report: how many were new, the running total, and a
/// preview of the first few.
pub fn numbers_added(added: usize, numbers: &[PhoneNumber]) -> String {
    let total = numbers.len();
    let mut out = format!("➕ {added} número(s) nuevo(s). Total: {total}.\n");
    for number in numbers.iter().take(PREVIEW_LIMIT) {
        out.push_str(&format!("  • {number}\n"));
    }
    if total > PREVIEW_LIMIT {
        out.push_str(&format!("  … y {} más\n", total - PREVIEW_LIMIT));
    }
    out.push_str("Envía más números o escribe *confirmar* para continuar.");
    out
}

pub fn no_numbers_found() -> String {
    "No encontré números válidos. Envíalos separados por comas o saltos de línea."
        .to_string()
}

pub fn no_more_numbers_found() -> String {
    "No encontré números válidos en ese mensaje. Envía más números o escribe \
     *confirmar* para continuar."
        .to_string()
}

pub fn confirm_empty_numbers() -> String {
    "La lista está vacía. Envía al menos un número antes de confirmar.".to_string()
}

pub fn ask_messages(total_numbers: usize) -> String {
    format!(
        "👥 {total_numbers} destinatario(s) confirmado(s). Ahora envíame los mensajes \
         a difundir, uno por mensaje. Cuando estén listos escribe *{SEND_TRIGGER}* \
         (exacto, en mayúsculas)."
    )
}

/// Echo of the queued bodies, each truncated for readability.
pub fn queue_echo(messages: &[String]) -> String {
    let mut out = String::from("📝 Mensajes en cola:\n");
    for (i, body) in messages.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, truncate(body, ECHO_LIMIT)));
    }
    out.push_str(&format!(
        "Agrega más mensajes o escribe *{SEND_TRIGGER}* para difundir."
    ));
    out
}

pub fn send_empty_queue() -> String {
    "No hay mensajes en cola. Escribe el mensaje que quieres difundir.".to_string()
}

pub fn dispatch_started(recipients: usize, messages: usize) -> String {
    format!(
        "🚀 Difusión iniciada: {messages} mensaje(s) para {recipients} número(s). \
         Te aviso cuando termine."
    )
}

pub fn dispatch_summary(report: &DispatchReport) -> String {
    format!(
        "✅ Difusión terminada.\n\
         Enviados: {}\n\
         Fallidos: {}\n\
         No alcanzables: {}",
        report.success, report.failed, report.unreachable
    )
}

pub fn cancelled() -> String {
    "❌ Sesión cancelada. La lista y los mensajes fueron descartados.".to_string()
}

pub fn not_expecting_document() -> String {
    "No estoy esperando un documento ahora mismo.".to_string()
}

pub fn unsupported_document() -> String {
    "Formato no soportado. Sube un archivo CSV o TXT.".to_string()
}

pub fn document_failed() -> String {
    "⚠️ No pude procesar el archivo. Inténtalo de nuevo.".to_string()
}

/// Truncate to `limit` characters with an ellipsis marker, respecting
/// char boundaries.
fn truncate(body: &str, limit: usize) -> String {
    if body.chars().count() <= limit {
        return body.to_string();
    }
    let mut out: String = body.chars().take(limit).collect();
    out.push('…');
    out
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phone::normalize;

    #[test]
    fn truncate_short_body_unchanged() {
        assert_eq!(truncate("hola", 50), "hola");
    }

    #[test]
    fn truncate_long_body_adds_ellipsis() {
        let body = "a".repeat(60);
        let out = truncate(&body, 50);
        assert_eq!(out.chars().count(), 51);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn truncate_respects_multibyte_chars() {
        let body = "ñ".repeat(60);
        let out = truncate(&body, 50);
        assert_eq!(out.chars().count(), 51);
    }

    #[test]
    fn numbers_added_previews_at_most_ten() {
        let numbers: Vec<_> = (0..12)
            .map(|i| normalize(&format!("9876543{i:02}")).unwrap())
            .collect();
        let out = numbers_added(12, &numbers);
        assert!(out.contains("Total: 12"));
        assert_eq!(out.matches("  • ").count(), 10);
        assert!(out.contains("y 2 más"));
    }

    #[test]
    fn numbers_added_small_list_has_no_overflow_line() {
        let numbers = vec![normalize("987654321").unwrap()];
        let out = numbers_added(1, &numbers);
        assert!(!out.contains("más\n"));
    }

    #[test]
    fn queue_echo_numbers_entries() {
        let messages = vec!["hola".to_string(), "b".repeat(80)];
        let out = queue_echo(&messages);
        assert!(out.contains("1. hola"));
        assert!(out.contains("2. "));
        assert!(out.contains('…'));
    }

    #[test]
    fn summary_carries_all_three_counters() {
        let report = DispatchReport {
            success: 5,
            failed: 2,
            unreachable: 1,
        };
        let out = dispatch_summary(&report);
        assert!(out.contains("Enviados: 5"));
        assert!(out.contains("Fallidos: 2"));
        assert!(out.contains("No alcanzables: 1"));
    }
}
