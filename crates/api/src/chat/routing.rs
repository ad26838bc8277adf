//! Who receives a message, and in what shape.
//!
//! Routing is planned as plain data so it can be tested without sockets:
//! each function returns the [`Delivery`] list the lifecycle layer pushes
//! through the connection manager.

use classchat_core::chat::{ChatMessage, Student, StudentStatus, TEACHER_LABEL};
use classchat_core::protocol::ServerEvent;
use classchat_core::roles::Role;
use classchat_core::types::ConnectionId;

use super::Membership;

/// One outbound event for one live connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub conn_id: ConnectionId,
    pub event: ServerEvent,
}

/// Routing class of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    /// Relayed from the AI assistant.
    Assistant,
    /// Teacher to one student.
    TeacherPrivate(&'a str),
    /// Teacher to every student.
    TeacherBroadcast,
    FromStudent,
    /// Server-generated notification.
    System,
}

impl<'a> Route<'a> {
    fn classify(msg: &'a ChatMessage) -> Self {
        if msg.is_from_ai() {
            return Route::Assistant;
        }
        match msg.role {
            Role::Teacher => match msg.recipient.as_deref() {
                Some(recipient) => Route::TeacherPrivate(recipient),
                None => Route::TeacherBroadcast,
            },
            Role::Student => Route::FromStudent,
            Role::System => Route::System,
            Role::Ai => Route::Assistant,
        }
    }
}

/// Ordered delivery list that never addresses one connection twice.
#[derive(Default)]
struct Plan(Vec<Delivery>);

impl Plan {
    fn push(&mut self, conn_id: Option<&str>, msg: ChatMessage) {
        let Some(conn_id) = conn_id else { return };
        if self.0.iter().any(|d| d.conn_id == conn_id) {
            return;
        }
        self.0.push(Delivery {
            conn_id: conn_id.to_string(),
            event: ServerEvent::Message(msg),
        });
    }
}

/// Live connection of the student with persistent id `student_id`.
pub fn student_connection<'a>(roster: &'a [Student], student_id: &str) -> Option<&'a str> {
    roster
        .iter()
        .find(|s| s.id == student_id && s.status != StudentStatus::Offline)
        .and_then(|s| s.connection_id.as_deref())
}

fn live_connections(roster: &[Student]) -> impl Iterator<Item = &str> {
    roster
        .iter()
        .filter(|s| s.status != StudentStatus::Offline)
        .filter_map(|s| s.connection_id.as_deref())
}

/// Plan the live deliveries of a persisted message.
///
/// `sender_conn` is the connection that sent it, `None` for
/// server-generated notices. `teacher` is the session's teacher slot and
/// `roster` its live students.
pub fn route_message(
    msg: &ChatMessage,
    sender_conn: Option<&str>,
    teacher: Option<&str>,
    roster: &[Student],
) -> Vec<Delivery> {
    let mut plan = Plan::default();

    match Route::classify(msg) {
        Route::Assistant => {
            plan.push(teacher, msg.clone());
            if let Some(recipient) = msg.recipient.as_deref() {
                plan.push(student_connection(roster, recipient), msg.clone());
            }
        }
        Route::TeacherPrivate(recipient) => {
            plan.push(
                student_connection(roster, recipient),
                msg.with_sender(TEACHER_LABEL),
            );
            plan.push(sender_conn, msg.clone());
        }
        Route::TeacherBroadcast => {
            let relabelled = msg.with_sender(TEACHER_LABEL);
            for conn in live_connections(roster) {
                plan.push(Some(conn), relabelled.clone());
            }
            plan.push(sender_conn, msg.clone());
        }
        Route::FromStudent => {
            plan.push(teacher, msg.clone());
            plan.push(sender_conn, msg.with_sender(msg.sender_name.clone()));
        }
        Route::System => {
            plan.push(teacher, msg.clone());
            match msg.recipient.as_deref() {
                Some(recipient) => plan.push(student_connection(roster, recipient), msg.clone()),
                None => {
                    for conn in live_connections(roster) {
                        plan.push(Some(conn), msg.clone());
                    }
                }
            }
        }
    }

    plan.0
}

/// Plan the relay of a typing indicator.
///
/// A student's indicator goes to the teacher, tagged with the student's
/// persistent id. A teacher's goes to the named student only.
pub fn route_typing(
    member: &Membership,
    is_typing: bool,
    recipient: Option<&str>,
    teacher: Option<&str>,
    roster: &[Student],
) -> Option<Delivery> {
    let (conn_id, student_id) = match member.role {
        Role::Student => (teacher?, member.student_id.clone()),
        Role::Teacher => (student_connection(roster, recipient?)?, None),
        Role::System | Role::Ai => return None,
    };

    Some(Delivery {
        conn_id: conn_id.to_string(),
        event: ServerEvent::UserTyping {
            username: member.username.clone(),
            is_typing,
            student_id,
        },
    })
}
