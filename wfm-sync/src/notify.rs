//! Notification synthesis
//!
//! A handful of server events carry user-facing payloads. Their text is built
//! here; nothing in this module touches cache state.

use wfm_common::events::{DomainEvent, EventKind, Notification};

const UNKNOWN_SENDER: &str = "Alguien";
const UNKNOWN_EMPLOYEE: &str = "Un empleado";

/// Build the notification for an event, if its kind produces one
pub fn notification_for(event: &DomainEvent) -> Option<Notification> {
    let notification = match &event.kind {
        EventKind::MessageReceived => {
            let sender = event.payload_str("senderName").unwrap_or(UNKNOWN_SENDER);
            Notification::info("Nuevo mensaje", format!("{} te ha enviado un mensaje", sender))
        }
        EventKind::DocumentUploaded => {
            let employee = event.payload_str("employeeName").unwrap_or(UNKNOWN_EMPLOYEE);
            let body = match event.payload_str("fileName") {
                Some(file) => format!("{} ha subido un documento: {}", employee, file),
                None => format!("{} ha subido un documento", employee),
            };
            Notification::info("Nuevo documento", body)
        }
        EventKind::WorkReportCreated => {
            let employee = event.payload_str("employeeName").unwrap_or(UNKNOWN_EMPLOYEE);
            Notification::info(
                "Nuevo parte de trabajo",
                format!("{} ha enviado un parte de trabajo", employee),
            )
        }
        EventKind::ReminderAllCompleted => {
            let body = match event.payload_str("title") {
                Some(title) => format!(
                    "Todos los empleados han completado el recordatorio \"{}\"",
                    title
                ),
                None => "Todos los empleados han completado el recordatorio".to_string(),
            };
            Notification::success("Recordatorio completado", body)
        }
        _ => return None,
    };

    Some(notification.with_source(event.kind.as_str()))
}
