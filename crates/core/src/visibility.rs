//! Which stored messages a participant is shown as history.
//!
//! A teacher sees everything in the session. A student sees a message iff:
//!
//! - it is a broadcast system notification, or
//! - the student sent it, or
//! - the teacher sent it to this student or to everyone, or
//! - the AI assistant sent it to this student.
//!
//! Messages in a student's slice are relabelled the way live delivery
//! relabels them: teacher messages carry the generic teacher label and the
//! student's own messages carry their display name.

use crate::chat::{ChatMessage, TEACHER_LABEL};
use crate::roles::Role;

/// Returns `true` if the student identified by `student_id` may see `msg`.
pub fn visible_to_student(msg: &ChatMessage, student_id: &str) -> bool {
    let addressed_to_student = msg.recipient.as_deref() == Some(student_id);

    if msg.sender == student_id {
        return true;
    }
    if msg.is_from_ai() {
        return addressed_to_student;
    }

    match msg.role {
        Role::System => msg.recipient.is_none(),
        Role::Teacher => msg.recipient.is_none() || addressed_to_student,
        Role::Student => false,
        Role::Ai => addressed_to_student,
    }
}

/// Copy of a visible `msg` as the student `student_id` is shown it.
///
/// Teacher connection ids never reach a student.
pub fn present_to_student(msg: &ChatMessage, student_id: &str) -> ChatMessage {
    if msg.sender == student_id {
        msg.with_sender(msg.sender_name.clone())
    } else if msg.role == Role::Teacher && !msg.is_from_ai() {
        msg.with_sender(TEACHER_LABEL)
    } else {
        msg.clone()
    }
}

/// The history slice shown to a participant joining with `role`.
///
/// `student_id` is required for students; a student without a persistent
/// id only sees broadcasts.
pub fn history_for(
    messages: &[ChatMessage],
    role: Role,
    student_id: Option<&str>,
) -> Vec<ChatMessage> {
    match role {
        Role::Teacher => messages.to_vec(),
        Role::Student | Role::System | Role::Ai => {
            let id = student_id.unwrap_or("");
            messages
                .iter()
                .filter(|m| visible_to_student(m, id))
                .map(|m| present_to_student(m, id))
                .collect()
        }
    }
}
