//! `mailq`-style listing of messages waiting to be sent.

use relayq_store::Message;

const HEADER: &str = "-Queue ID- --Size-- ----Arrival Time---- -----Last attempt at------ -Attempts- -Sender/Recipient--------------------------------------";

const ARRIVAL_FORMAT: &str = "%a %b %d %H:%M:%S";
const ATTEMPT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Width of a formatted last-attempt time, used to blank never-tried rows.
const ATTEMPT_WIDTH: usize = 30;

/// Renders the report for `pending`, which should be in creation order.
#[must_use]
pub fn report(pending: &[Message]) -> String {
    if pending.is_empty() {
        return "Mail queue is empty\n".to_string();
    }

    let mut lines = Vec::with_capacity(pending.len() + 2);
    let mut total_size = 0;

    lines.push(HEADER.to_string());
    for message in pending {
        let size = message.size();
        total_size += size;

        let arrival = message.created_at.format(ARRIVAL_FORMAT);
        let last_attempt = message.last_attempt_at().map_or_else(
            || " ".repeat(ATTEMPT_WIDTH),
            |at| at.format(ATTEMPT_FORMAT).to_string(),
        );

        lines.push(format!(
            "{:>10} {:>8} {arrival}   {last_attempt}  {:>7} {} -> {}",
            message.id, size, message.attempts, message.from, message.to
        ));
    }

    lines.push(format!(
        "-- {} Kbytes in {} Requests.",
        total_size / 1024,
        pending.len()
    ));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn empty_queue() {
        assert_eq!(report(&[]), "Mail queue is empty\n");
    }

    #[test]
    fn lists_each_message() {
        // 2009-02-13 23:31:30 UTC, a Friday.
        let arrived = at(1_234_567_890);

        let never_tried = Message::new(7, "app@example.com", "a@example.org", "hello", arrived);

        let mut retried = Message::new(
            1_234,
            "app@example.com",
            "b@example.org",
            vec![b'x'; 2_048],
            arrived,
        );
        retried.record_attempt(at(1_234_567_950));
        retried.record_attempt(at(1_234_568_250));

        let expected = format!(
            "{HEADER}\n\
             {:>10} {:>8} Fri Feb 13 23:31:30   {}  {:>7} app@example.com -> a@example.org\n\
             {:>10} {:>8} Fri Feb 13 23:31:30   Fri Feb 13 23:37:30 +0000 2009  {:>7} app@example.com -> b@example.org\n\
             -- 2 Kbytes in 2 Requests.\n",
            7,
            5,
            " ".repeat(30),
            0,
            1_234,
            2_048,
            2,
        );

        assert_eq!(report(&[never_tried, retried]), expected);
    }
}
