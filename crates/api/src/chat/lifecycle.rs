//! Inbound event dispatch and the join / leave / kick lifecycle.
//!
//! Every event runs through [`ChatService::dispatch`]. Handlers return
//! `Result<(), ChatError>`; a failure is logged and reported to the
//! initiating connection as one `error` event, and never reaches any other
//! connection.

use std::sync::Arc;

use classchat_core::chat::{
    ChatMessage, MessageKind, Student, StudentStatus, AI_SENDER,
};
use classchat_core::identity::new_message_id;
use classchat_core::protocol::{
    ClientEvent, JoinRoom, KickStudent, LeaveRoom, SelectStudent, SendMessage, ServerEvent, Typing,
};
use classchat_core::roles::Role;
use classchat_core::types::now;
use classchat_core::visibility::history_for;
use classchat_db::{ChatStore, MessageFilter, StoreError};
use validator::Validate;

use super::routing::{route_message, route_typing, Delivery};
use super::{ChatError, ConnectionState, IdentityResolver, Membership, PresenceCache};
use crate::ws::manager::WsManager;

/// Display name of AI relays that do not name themselves.
const AI_DISPLAY_NAME: &str = "AI Assistant";

const SESSION_ENDED: &str = "Session has ended";

/// Drives every connection through its session lifecycle.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    presence: PresenceCache,
    identity: IdentityResolver,
    ws: Arc<WsManager>,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, ws: Arc<WsManager>) -> Self {
        Self {
            presence: PresenceCache::new(store.clone()),
            identity: IdentityResolver::new(store.clone()),
            store,
            ws,
        }
    }

    pub fn presence(&self) -> &PresenceCache {
        &self.presence
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Decode and dispatch one text frame.
    pub async fn handle_frame(&self, conn_id: &str, text: &str) {
        match ClientEvent::decode(text) {
            Ok(event) => self.dispatch(conn_id, event).await,
            Err(e) => self.reject(conn_id, "frame", e.into()).await,
        }
    }

    /// Run one inbound event to completion.
    pub async fn dispatch(&self, conn_id: &str, event: ClientEvent) {
        let name = event.name();
        tracing::debug!(conn_id = %conn_id, event = name, "Dispatching event");

        let result = match event {
            ClientEvent::JoinRoom(join) => self.join(conn_id, join).await,
            ClientEvent::SendMessage(send) => self.send_message(conn_id, send).await,
            ClientEvent::Typing(typing) => self.typing(conn_id, typing).await,
            ClientEvent::SelectStudent(select) => self.select_student(conn_id, select).await,
            ClientEvent::KickStudent(kick) => self.kick(conn_id, kick).await,
            ClientEvent::LeaveRoom(leave) => self.leave(conn_id, leave).await,
        };

        if let Err(err) = result {
            self.reject(conn_id, name, err).await;
        }
    }

    /// Transport-level disconnect: unregister the connection and run the
    /// departure flow if it was still joined.
    pub async fn disconnect(&self, conn_id: &str) {
        let Some(state) = self.ws.remove(conn_id).await else {
            return;
        };
        if let ConnectionState::Joined(member) = state {
            let session_id = member.session_id.clone();
            if let Err(err) = self.depart(conn_id, member).await {
                tracing::error!(
                    conn_id = %conn_id,
                    session_id = %session_id,
                    error = %err,
                    "Departure after disconnect failed"
                );
            }
        }
    }

    /// Mark a session inactive and drop its cached presence.
    ///
    /// Connections joined to the session move to `Left` and receive a final
    /// notice; their sockets stay open. Returns `false` if the session does
    /// not exist.
    pub async fn end_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let ended = self.store.end_session(session_id).await?;
        if !ended {
            return Ok(false);
        }

        let left = self.ws.leave_session(session_id).await;
        self.presence.clear_session(session_id).await;
        let notice = ServerEvent::Message(ChatMessage::system_notice(
            session_id,
            SESSION_ENDED,
        ));
        for conn_id in &left {
            self.ws.send_event(conn_id, &notice).await;
        }
        tracing::info!(session_id, connections = left.len(), "Session ended");
        Ok(true)
    }

    async fn reject(&self, conn_id: &str, event: &str, err: ChatError) {
        match &err {
            ChatError::Storage(e) | ChatError::JoinFailed(e) => {
                tracing::error!(conn_id = %conn_id, event, error = %e, "Event failed on storage");
            }
            other => {
                tracing::warn!(conn_id = %conn_id, event, error = %other, "Event rejected");
            }
        }
        self.ws
            .send_event(conn_id, &ServerEvent::error(err.client_message()))
            .await;
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    async fn join(&self, conn_id: &str, join: JoinRoom) -> Result<(), ChatError> {
        join.validate()?;
        if !join.role.can_join() {
            return Err(ChatError::Forbidden(format!(
                "Cannot join a session as {}",
                join.role
            )));
        }
        match self.ws.state(conn_id).await {
            Some(ConnectionState::Unjoined) => {}
            Some(_) => {
                return Err(ChatError::Validation(
                    "Connection has already joined a session".into(),
                ))
            }
            None => return Ok(()),
        }

        let session_id = join.session_id.as_str();
        let session = self
            .store
            .get_session(session_id)
            .await
            .map_err(ChatError::JoinFailed)?
            .ok_or_else(|| ChatError::NotFound(format!("Session {session_id} not found")))?;
        if !session.is_active() {
            return Err(ChatError::Validation(SESSION_ENDED.into()));
        }

        let username = join.username.trim().to_string();
        let student_id = self
            .identity
            .resolve(
                session_id,
                &username,
                join.role,
                join.persistent_student_id.as_deref(),
            )
            .await
            .map_err(ChatError::JoinFailed)?;

        self.presence
            .load_students(session_id)
            .await
            .map_err(ChatError::JoinFailed)?;
        let history = self
            .presence
            .load_history(session_id)
            .await
            .map_err(ChatError::JoinFailed)?;

        match &student_id {
            Some(id) => {
                let student = Student {
                    id: id.clone(),
                    session_id: session_id.to_string(),
                    username: username.clone(),
                    status: StudentStatus::Online,
                    last_active: now(),
                    connection_id: Some(conn_id.to_string()),
                };
                self.store
                    .upsert_student(&student)
                    .await
                    .map_err(ChatError::JoinFailed)?;
                self.presence.upsert_student(student).await;
            }
            None => {
                if let Some(previous) = self.presence.set_teacher(session_id, conn_id).await {
                    tracing::info!(
                        session_id,
                        previous = %previous,
                        conn_id = %conn_id,
                        "Teacher slot moved to a newer connection"
                    );
                }
            }
        }

        let member = Membership {
            session_id: session_id.to_string(),
            role: join.role,
            username: username.clone(),
            student_id: student_id.clone(),
        };
        self.ws
            .set_state(conn_id, ConnectionState::Joined(member))
            .await;

        tracing::info!(
            conn_id = %conn_id,
            session_id,
            role = %join.role,
            student_id = ?student_id,
            "Joined session"
        );

        self.ws
            .send_event(
                conn_id,
                &ServerEvent::SessionJoined {
                    session_id: session_id.to_string(),
                    role: join.role,
                    student_id: student_id.clone(),
                },
            )
            .await;
        self.ws
            .send_event(
                conn_id,
                &ServerEvent::ChatHistory(history_for(&history, join.role, student_id.as_deref())),
            )
            .await;

        let notice =
            ChatMessage::system_notice(session_id, format!("{username} has joined as {}", join.role));
        self.record(&notice).await?;
        self.route(&notice, None).await;
        self.push_roster(session_id).await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Messages and typing
    // -----------------------------------------------------------------------

    async fn send_message(&self, conn_id: &str, send: SendMessage) -> Result<(), ChatError> {
        send.validate()?;
        let member = self.membership(conn_id, &send.session_id).await?;
        let msg = compose(conn_id, &member, send)?;

        self.record(&msg).await?;
        self.route(&msg, Some(conn_id)).await;
        tracing::debug!(
            session_id = %member.session_id,
            message_id = %msg.id,
            role = %msg.role,
            recipient = ?msg.recipient,
            "Message relayed"
        );

        if let Some(student_id) = &member.student_id {
            self.touch_student(&member.session_id, student_id).await?;
            self.push_roster(&member.session_id).await;
        }
        Ok(())
    }

    /// Mark a student `active` after they sent something.
    async fn touch_student(&self, session_id: &str, student_id: &str) -> Result<(), ChatError> {
        let seen_at = now();
        self.store
            .update_student_status(session_id, student_id, StudentStatus::Active, seen_at)
            .await?;
        if let Some(mut student) = self.presence.find_student(session_id, student_id).await {
            student.status = StudentStatus::Active;
            student.last_active = seen_at;
            self.presence.upsert_student(student).await;
        }
        Ok(())
    }

    async fn typing(&self, conn_id: &str, typing: Typing) -> Result<(), ChatError> {
        let member = self.membership(conn_id, &typing.session_id).await?;
        let teacher = self.presence.teacher(&member.session_id).await;
        let roster = self.presence.roster(&member.session_id).await;

        if let Some(delivery) = route_typing(
            &member,
            typing.is_typing,
            typing.recipient.as_deref(),
            teacher.as_deref(),
            &roster,
        ) {
            self.deliver(vec![delivery]).await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teacher actions
    // -----------------------------------------------------------------------

    async fn select_student(&self, conn_id: &str, select: SelectStudent) -> Result<(), ChatError> {
        let member = self.membership(conn_id, &select.session_id).await?;
        if member.role != Role::Teacher {
            return Err(ChatError::Forbidden(
                "Only the teacher can view a student's chat".into(),
            ));
        }
        let key = select.student_id.trim();
        if key.is_empty() {
            return Err(ChatError::Validation("studentId is required".into()));
        }

        let student = self
            .lookup_student(&member.session_id, key)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("Student {key} not found")))?;
        let chat = self
            .store
            .list_messages(
                &member.session_id,
                &MessageFilter::InvolvingStudent {
                    student_id: student.id,
                    username: student.username,
                },
            )
            .await?;

        self.ws
            .send_event(
                conn_id,
                &ServerEvent::StudentChatHistory {
                    student_id: select.student_id,
                    chat,
                },
            )
            .await;
        Ok(())
    }

    async fn kick(&self, conn_id: &str, kick: KickStudent) -> Result<(), ChatError> {
        let member = self.membership(conn_id, &kick.session_id).await?;
        let requested = kick.target().unwrap_or_default().to_string();

        if member.role != Role::Teacher {
            self.kick_failed(conn_id, requested, "Only the teacher can remove students")
                .await;
            return Ok(());
        }
        let Some(key) = kick.target() else {
            return Err(ChatError::Validation(
                "studentId or persistentId is required".into(),
            ));
        };
        let Some(student) = self.lookup_student(&member.session_id, key).await? else {
            self.kick_failed(conn_id, requested, "Student not found").await;
            return Ok(());
        };

        if let Some(target) = student.connection_id.as_deref() {
            self.ws
                .send_event(
                    target,
                    &ServerEvent::KickedFromSession {
                        message: "You have been removed from this session by the teacher".into(),
                    },
                )
                .await;
            self.ws.close(target).await;
        }

        self.store
            .delete_student(&member.session_id, &student.id)
            .await?;
        self.presence
            .remove_student(&member.session_id, &student.id)
            .await;
        tracing::info!(
            session_id = %member.session_id,
            student_id = %student.id,
            "Student removed from session"
        );

        let notice = ChatMessage::system_notice(
            member.session_id.as_str(),
            format!("{} was removed from the session", student.username),
        );
        self.record(&notice).await?;
        self.ws
            .send_event(conn_id, &ServerEvent::Message(notice))
            .await;
        self.ws
            .send_event(
                conn_id,
                &ServerEvent::StudentKicked {
                    student_id: requested,
                    success: true,
                    message: None,
                },
            )
            .await;
        self.push_roster(&member.session_id).await;
        Ok(())
    }

    async fn kick_failed(&self, conn_id: &str, student_id: String, message: &str) {
        tracing::warn!(conn_id = %conn_id, student_id = %student_id, reason = message, "Kick refused");
        self.ws
            .send_event(
                conn_id,
                &ServerEvent::StudentKicked {
                    student_id,
                    success: false,
                    message: Some(message.to_string()),
                },
            )
            .await;
    }

    // -----------------------------------------------------------------------
    // Leave / disconnect
    // -----------------------------------------------------------------------

    async fn leave(&self, conn_id: &str, leave: LeaveRoom) -> Result<(), ChatError> {
        let member = self.membership(conn_id, &leave.session_id).await?;
        self.ws.set_state(conn_id, ConnectionState::Left).await;
        self.depart(conn_id, member).await
    }

    async fn depart(&self, conn_id: &str, member: Membership) -> Result<(), ChatError> {
        let session_id = member.session_id.as_str();

        let Some(student_id) = member.student_id.as_deref() else {
            if !self.presence.clear_teacher_if(session_id, conn_id).await {
                tracing::debug!(conn_id = %conn_id, session_id, "Superseded teacher connection left");
                return Ok(());
            }
            tracing::info!(conn_id = %conn_id, session_id, "Teacher left session");
            let notice = ChatMessage::system_notice(
                session_id,
                format!("{} (teacher) has left the session", member.username),
            );
            self.record(&notice).await?;
            self.route(&notice, None).await;
            self.presence.evict_if_idle(session_id).await;
            return Ok(());
        };

        // A newer connection of the same student owns the record now.
        let Some(current) = self.lookup_student(session_id, student_id).await? else {
            return Ok(());
        };
        if current.connection_id.as_deref() != Some(conn_id) {
            tracing::debug!(conn_id = %conn_id, student_id, "Superseded student connection left");
            return Ok(());
        }

        self.store
            .update_student_status(session_id, student_id, StudentStatus::Offline, now())
            .await?;
        self.presence.remove_student(session_id, student_id).await;
        tracing::info!(conn_id = %conn_id, session_id, student_id, "Student left session");

        let notice = ChatMessage {
            id: new_message_id(),
            session_id: session_id.to_string(),
            sender: student_id.to_string(),
            sender_name: member.username.clone(),
            text: format!("{} has left the session", member.username),
            timestamp: now(),
            kind: MessageKind::Notification,
            role: Role::Student,
            recipient: None,
        };
        self.record(&notice).await?;
        if let Some(teacher) = self.presence.teacher(session_id).await {
            self.ws
                .send_event(&teacher, &ServerEvent::Message(notice))
                .await;
        }
        self.push_roster(session_id).await;
        if self.presence.evict_if_idle(session_id).await {
            tracing::debug!(session_id, "Evicted idle session from presence cache");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Membership of a connection joined to `session_id`.
    async fn membership(&self, conn_id: &str, session_id: &str) -> Result<Membership, ChatError> {
        match self.ws.state(conn_id).await {
            Some(ConnectionState::Joined(member)) if member.session_id == session_id => Ok(member),
            Some(ConnectionState::Joined(member)) => Err(ChatError::Validation(format!(
                "Connection is joined to session {}",
                member.session_id
            ))),
            _ => Err(ChatError::NotJoined),
        }
    }

    /// Find a student by persistent or connection id, cache first.
    async fn lookup_student(&self, session_id: &str, key: &str) -> Result<Option<Student>, ChatError> {
        if let Some(student) = self.presence.find_student(session_id, key).await {
            return Ok(Some(student));
        }
        Ok(self.store.find_student(session_id, key).await?)
    }

    /// Persist a message, then mirror it into the cache.
    async fn record(&self, msg: &ChatMessage) -> Result<(), ChatError> {
        self.store.insert_message(msg).await?;
        self.presence.append_message(msg.clone()).await;
        Ok(())
    }

    async fn route(&self, msg: &ChatMessage, sender_conn: Option<&str>) {
        let teacher = self.presence.teacher(&msg.session_id).await;
        let roster = self.presence.roster(&msg.session_id).await;
        self.deliver(route_message(msg, sender_conn, teacher.as_deref(), &roster))
            .await;
    }

    async fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            if !self.ws.send_event(&delivery.conn_id, &delivery.event).await {
                tracing::debug!(conn_id = %delivery.conn_id, "Dropped delivery to closed connection");
            }
        }
    }

    /// Push the live roster to the session's teacher, if one is connected.
    async fn push_roster(&self, session_id: &str) {
        if let Some(teacher) = self.presence.teacher(session_id).await {
            let roster = self.presence.roster(session_id).await;
            self.ws
                .send_event(&teacher, &ServerEvent::StudentList(roster))
                .await;
        }
    }
}

/// Build the stored message for a `send_message` event.
///
/// The sender is the student's persistent id, or the teacher's connection
/// id. A client may only claim its own role, or `ai` when relaying the
/// assistant. Student messages are never addressed; AI relays default to
/// the relaying student.
fn compose(conn_id: &str, member: &Membership, send: SendMessage) -> Result<ChatMessage, ChatError> {
    let SendMessage {
        session_id,
        message,
        recipient,
    } = send;

    let role = match message.role {
        None => member.role,
        Some(role) if role == member.role || role == Role::Ai => role,
        Some(role) => {
            return Err(ChatError::Forbidden(format!(
                "Cannot send as {role} from a {} connection",
                member.role
            )))
        }
    };

    let (sender, sender_name, recipient) = match role {
        Role::Ai => (
            AI_SENDER.to_string(),
            message
                .sender
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| AI_DISPLAY_NAME.to_string()),
            recipient.or_else(|| member.student_id.clone()),
        ),
        Role::Teacher => (conn_id.to_string(), member.username.clone(), recipient),
        Role::Student | Role::System => (
            member
                .student_id
                .clone()
                .unwrap_or_else(|| conn_id.to_string()),
            member.username.clone(),
            None,
        ),
    };

    Ok(ChatMessage {
        id: message
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_message_id),
        session_id,
        sender,
        sender_name,
        text: message.text.trim().to_string(),
        timestamp: now(),
        kind: message.kind.unwrap_or_default(),
        role,
        recipient,
    })
}
