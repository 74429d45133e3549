//! Welcome and goodbye messages for membership changes

use crate::moderation::engine::ModerationEngine;
use crate::moderation::platform::MemberRole;
use crate::store::{ChatPolicy, SYSTEM_ADMIN_ID};
use tracing::{info, warn};

pub const DEFAULT_WELCOME: &str = "Welcome to the group, {user}!";
pub const DEFAULT_GOODBYE: &str = "Goodbye, {user}!";

const PLACEHOLDERS: [&str; 5] = ["{user}", "{first_name}", "{last_name}", "{username}", "{group}"];

/// The member a join or leave event is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub user_id: u64,
    /// Platform mention markup
    pub mention: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

/// Fill a welcome or goodbye template
///
/// Unknown `{...}` sequences are left as they are, and substituted values are
/// never scanned again.
#[must_use]
pub fn render_template(template: &str, member: &MemberProfile, group: &str) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let tail = &rest[start..];
        let matched = PLACEHOLDERS
            .iter()
            .find_map(|key| tail.strip_prefix(key).map(|after| (*key, after)));

        match matched {
            Some((key, after)) => {
                match key {
                    "{user}" => rendered.push_str(&member.mention),
                    "{first_name}" => rendered.push_str(&member.first_name),
                    "{last_name}" => rendered.push_str(member.last_name.as_deref().unwrap_or("")),
                    "{username}" => {
                        if let Some(username) = &member.username {
                            rendered.push('@');
                            rendered.push_str(username);
                        }
                    }
                    _ => rendered.push_str(group),
                }
                rest = after;
            }
            None => {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

#[derive(Debug, Clone, Copy)]
enum Greeting {
    Welcome,
    Goodbye,
}

impl ModerationEngine {
    /// Greet a new member and audit the join
    pub async fn on_member_joined(&self, chat_id: u64, member: &MemberProfile) {
        self.greet(chat_id, member, Greeting::Welcome).await;
        self.record_audit(chat_id, member.user_id, SYSTEM_ADMIN_ID, "joined the group")
            .await;
    }

    /// Say goodbye and audit the departure, noting bans
    pub async fn on_member_left(&self, chat_id: u64, member: &MemberProfile) {
        self.greet(chat_id, member, Greeting::Goodbye).await;

        let action = match self.platform.get_chat_member(chat_id, member.user_id).await {
            Ok(MemberRole::Banned) => "was banned from the group",
            Ok(_) => "left the group",
            Err(e) => {
                warn!(chat_id, user_id = member.user_id, error = %e, "Could not check departure reason");
                "left the group"
            }
        };
        self.record_audit(chat_id, member.user_id, SYSTEM_ADMIN_ID, action)
            .await;
    }

    async fn greet(&self, chat_id: u64, member: &MemberProfile, greeting: Greeting) {
        let policy = match self.store.get_policy(chat_id).await {
            Ok(policy) => policy,
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to load chat policy, using default template");
                None
            }
        };
        let template = template_for(policy.as_ref(), greeting);

        let group = self.platform.chat_title(chat_id).await.unwrap_or_default();
        let text = render_template(template, member, &group);

        match self.platform.send_message(chat_id, &text).await {
            Ok(()) => info!(chat_id, user_id = member.user_id, ?greeting, "Greeting sent"),
            Err(e) => warn!(chat_id, user_id = member.user_id, error = %e, "Failed to send greeting"),
        }
    }
}

fn template_for(policy: Option<&ChatPolicy>, greeting: Greeting) -> &str {
    let custom = policy.and_then(|policy| match greeting {
        Greeting::Welcome => policy.welcome_message.as_deref(),
        Greeting::Goodbye => policy.goodbye_message.as_deref(),
    });
    custom.unwrap_or(match greeting {
        Greeting::Welcome => DEFAULT_WELCOME,
        Greeting::Goodbye => DEFAULT_GOODBYE,
    })
}
