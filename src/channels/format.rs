//! Text rendering shared by the channel adapters.

use super::{NudgeReply, SessionSummary, ThreadInfo};

/// Markup flavour understood by the target surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    /// `**bold**`
    Markdown,
    /// `*bold*` (team-chat mrkdwn)
    Mrkdwn,
    /// SMS
    Plain,
}

impl Markup {
    fn bold(&self, text: &str) -> String {
        match self {
            Markup::Markdown => format!("**{text}**"),
            Markup::Mrkdwn => format!("*{text}*"),
            Markup::Plain => text.to_string(),
        }
    }
}

pub fn session_start(info: &ThreadInfo, markup: Markup) -> String {
    let title = info.meeting_title.as_deref().unwrap_or("Untitled meeting");
    format!(
        "{} for {}\n{} · {} · {} bot\nStarted {}",
        markup.bold("Live coaching started"),
        info.member.name,
        title,
        info.platform,
        info.bot_type,
        info.start_time.format("%H:%M UTC"),
    )
}

pub fn nudge(reply: &NudgeReply, markup: Markup) -> String {
    match markup {
        Markup::Plain => format!("Coach: {}", reply.message),
        _ => format!(
            "{} {}\n_{} · batch {} · {} messages analyzed · {}_",
            markup.bold("Nudge:"),
            reply.message,
            humanize_reason(&reply.reason),
            reply.batch_number,
            reply.messages_analyzed,
            reply.timestamp.format("%H:%M:%S"),
        ),
    }
}

pub fn summary(summary: &SessionSummary, markup: Markup) -> String {
    let nudges = match summary.total_nudges {
        1 => "1 nudge".to_string(),
        n => format!("{n} nudges"),
    };
    format!(
        "{} {} min · {} · ended {}",
        markup.bold("Session ended."),
        summary.duration_minutes,
        nudges,
        summary.end_time.format("%H:%M UTC"),
    )
}

/// `missed_next_steps` → `Missed next steps`
pub fn humanize_reason(reason: &str) -> String {
    let spaced = reason.trim().replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Coaching".to_string(),
    }
}
