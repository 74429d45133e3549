//! `/warnings` listing

use crate::moderation::engine::{ModerationEngine, log_rejection};
use crate::moderation::error::{ModerationError, ModerationResult};

impl ModerationEngine {
    /// Warnings held by the target, newest first. Open to every member.
    ///
    /// The target is the author of the replied-to message, otherwise the user
    /// named by `identifier`.
    pub async fn warnings_report(
        &self,
        chat_id: u64,
        issuer_id: u64,
        reply_author: Option<u64>,
        identifier: Option<&str>,
    ) -> String {
        match self
            .try_warnings_report(chat_id, issuer_id, reply_author, identifier)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                log_rejection("warnings", chat_id, issuer_id, &e);
                e.reply_text("warnings")
            }
        }
    }

    async fn try_warnings_report(
        &self,
        chat_id: u64,
        issuer_id: u64,
        reply_author: Option<u64>,
        identifier: Option<&str>,
    ) -> ModerationResult<String> {
        self.cooldown(issuer_id, "warnings")?;
        let target_id = match (reply_author, identifier) {
            (Some(author), _) => author,
            (None, Some(identifier)) => self.resolve_identifier(identifier).await?,
            (None, None) => return Err(ModerationError::NoTarget),
        };

        let threshold = self.ledger.get_threshold(chat_id).await?;
        let warnings = self.ledger.list_warnings(chat_id, target_id).await?;
        if warnings.is_empty() {
            return Ok("This user has no warnings.".to_string());
        }

        let mut report = format!(
            "**Warnings for {}** ({}/{threshold}):\n\n",
            self.display_name(target_id).await,
            warnings.len()
        );
        for (index, warning) in warnings.iter().enumerate() {
            let admin = self.display_name(warning.admin_id).await;
            let line = format!(
                "{}. By {admin} on {}",
                index + 1,
                warning.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            report.push_str(&line);
            if let Some(reason) = &warning.reason {
                report.push_str(": ");
                report.push_str(reason);
            }
            report.push('\n');
        }
        Ok(report)
    }

    async fn display_name(&self, user_id: u64) -> String {
        self.platform
            .user_display_name(user_id)
            .await
            .unwrap_or_else(|_| user_id.to_string())
    }
}
