//! `application/simple-message-summary` bodies (RFC 3842)

use crate::voicemail::MessageStats;

/// Render a message summary body.
///
/// An empty mailbox only reports `Messages-Waiting: no`; otherwise the
/// voice message counts follow as `unread/total`.
pub fn render_summary(stats: MessageStats) -> String {
    if stats.total > 0 {
        let waiting = if stats.unread > 0 { "yes" } else { "no" };
        format!(
            "Messages-Waiting: {}\r\nVoice-Message: {}/{}\r\n",
            waiting, stats.unread, stats.total
        )
    } else {
        "Messages-Waiting: no\r\n".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_mailbox() {
        assert_eq!(render_summary(MessageStats::new(0, 0)), "Messages-Waiting: no\r\n");
    }

    #[test]
    fn test_unread_messages() {
        assert_eq!(
            render_summary(MessageStats::new(5, 2)),
            "Messages-Waiting: yes\r\nVoice-Message: 2/5\r\n"
        );
    }

    #[test]
    fn test_all_read() {
        assert_eq!(
            render_summary(MessageStats::new(3, 0)),
            "Messages-Waiting: no\r\nVoice-Message: 0/3\r\n"
        );
    }
}
