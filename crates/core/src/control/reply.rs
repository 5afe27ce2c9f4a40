use onion_common::{config::control::STATUS_OK, OnionError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One line of a control-protocol reply
///
/// A `+` line carries a dot-terminated data block; its payload lines are
/// kept alongside the line text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    pub text: String,
    pub data: Vec<String>,
}

/// A complete control-protocol reply
///
/// Wire framing: every line is `<3-digit code><sep><text>` where the
/// separator is `-` for a mid line, `+` for a line opening a data block
/// (terminated by a lone `.`), and a space for the final line. All lines
/// of one reply carry the same status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<ReplyLine>,
}

impl Reply {
    /// Read one complete reply from the control connection
    ///
    /// Any malformed framing (short line, non-numeric code, unknown
    /// separator, EOF mid-reply, unterminated data block) is a protocol
    /// error; the daemon is not retried.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut code: Option<u16> = None;
        let mut lines = Vec::new();

        loop {
            let line = read_wire_line(reader).await?;
            if line.len() < 4 {
                return Err(OnionError::protocol(format!(
                    "reply line too short: {:?}",
                    line
                )));
            }

            if !line.as_bytes()[..3].iter().all(u8::is_ascii_digit) {
                return Err(OnionError::protocol(format!(
                    "non-numeric status code in {:?}",
                    line
                )));
            }
            let (status, rest) = line.split_at(3);
            let status: u16 = status.parse().map_err(|_| {
                OnionError::protocol(format!("non-numeric status code in {:?}", line))
            })?;

            match code {
                None => code = Some(status),
                Some(expected) if expected != status => {
                    return Err(OnionError::protocol(format!(
                        "mixed status codes in reply: {} then {}",
                        expected, status
                    )));
                }
                Some(_) => {}
            }

            let sep = rest.as_bytes()[0];
            if !matches!(sep, b'-' | b'+' | b' ') {
                return Err(OnionError::protocol(format!(
                    "unknown reply separator {:?} in {:?}",
                    sep as char, line
                )));
            }
            let text = rest[1..].to_string();

            match sep {
                b'-' => lines.push(ReplyLine { text, data: Vec::new() }),
                b'+' => {
                    let data = read_data_block(reader).await?;
                    lines.push(ReplyLine { text, data });
                }
                _ => {
                    lines.push(ReplyLine { text, data: Vec::new() });
                    break;
                }
            }
        }

        // code is always set once the loop has pushed a final line
        let code = code.ok_or_else(|| OnionError::protocol("empty reply"))?;
        Ok(Self { code, lines })
    }

    /// Whether the daemon reported success
    pub fn is_ok(&self) -> bool {
        self.code == STATUS_OK
    }

    /// The text of the final status line
    pub fn status_text(&self) -> &str {
        self.lines.last().map(|l| l.text.as_str()).unwrap_or("")
    }

    /// Look up a `Key=value` pair across the reply lines
    pub fn keyword(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            line.text
                .strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    /// Collect the values of a list-valued `key=` reply
    ///
    /// The daemon renders short lists inline (`250-key=a b`) and longer
    /// ones as a data block under `250+key=`. An empty value means an
    /// empty list. Returns `None` when the key is absent entirely.
    pub fn list_values(&self, key: &str) -> Option<Vec<String>> {
        let line = self.lines.iter().find(|line| {
            line.text
                .strip_prefix(key)
                .map_or(false, |rest| rest.starts_with('='))
        })?;

        let inline = &line.text[key.len() + 1..];
        let mut values: Vec<String> = inline
            .split_whitespace()
            .map(str::to_string)
            .collect();
        values.extend(
            line.data
                .iter()
                .filter(|l| !l.is_empty())
                .map(|l| l.to_string()),
        );
        Some(values)
    }
}

/// Read one CRLF-terminated line, trimmed of its terminator
async fn read_wire_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(OnionError::protocol("connection closed mid-reply"));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

/// Read the payload of a `+` data block up to the terminating `.`
async fn read_data_block<R>(reader: &mut R) -> Result<Vec<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut data = Vec::new();
    loop {
        let line = read_wire_line(reader).await?;
        if line == "." {
            return Ok(data);
        }
        // A payload line starting with a dot is transmitted dot-stuffed
        if let Some(rest) = line.strip_prefix("..") {
            data.push(format!(".{}", rest));
        } else {
            data.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(wire: &str) -> Result<Reply> {
        let mut reader = wire.as_bytes();
        Reply::read_from(&mut reader).await
    }

    #[tokio::test]
    async fn parses_single_line_ok() {
        let reply = parse("250 OK\r\n").await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.status_text(), "OK");
        assert_eq!(reply.lines.len(), 1);
    }

    #[tokio::test]
    async fn parses_mid_lines_and_keywords() {
        let reply = parse("250-ServiceID=abc123\r\n250 OK\r\n").await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.keyword("ServiceID"), Some("abc123"));
        assert_eq!(reply.keyword("PrivateKey"), None);
    }

    #[tokio::test]
    async fn parses_error_status() {
        let reply = parse("515 Authentication failed\r\n").await.unwrap();
        assert!(!reply.is_ok());
        assert_eq!(reply.code, 515);
        assert_eq!(reply.status_text(), "Authentication failed");
    }

    #[tokio::test]
    async fn parses_data_block_list() {
        let wire = "250+onions/current=\r\nabc123\r\ndef456\r\n.\r\n250 OK\r\n";
        let reply = parse(wire).await.unwrap();
        let ids = reply.list_values("onions/current").unwrap();
        assert_eq!(ids, vec!["abc123", "def456"]);
    }

    #[tokio::test]
    async fn parses_inline_list_value() {
        let reply = parse("250-onions/current=abc123\r\n250 OK\r\n")
            .await
            .unwrap();
        assert_eq!(
            reply.list_values("onions/current").unwrap(),
            vec!["abc123"]
        );
    }

    #[tokio::test]
    async fn empty_list_value_is_an_empty_list() {
        let reply = parse("250-onions/current=\r\n250 OK\r\n").await.unwrap();
        assert!(reply.list_values("onions/current").unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let reply = parse("250 OK\r\n").await.unwrap();
        assert!(reply.list_values("onions/current").is_none());
    }

    #[tokio::test]
    async fn unstuffs_leading_dots_in_data_blocks() {
        let wire = "250+note=\r\n..hidden\r\n.\r\n250 OK\r\n";
        let reply = parse(wire).await.unwrap();
        assert_eq!(reply.lines[0].data, vec![".hidden"]);
    }

    #[tokio::test]
    async fn rejects_short_line() {
        let err = parse("25\r\n").await.unwrap_err();
        assert!(matches!(err, OnionError::Protocol(_)));
    }

    #[tokio::test]
    async fn rejects_non_numeric_code() {
        let err = parse("2x0 OK\r\n").await.unwrap_err();
        assert!(matches!(err, OnionError::Protocol(_)));
    }

    #[tokio::test]
    async fn rejects_mixed_status_codes() {
        let err = parse("250-ServiceID=abc\r\n550 oops\r\n").await.unwrap_err();
        assert!(matches!(err, OnionError::Protocol(_)));
    }

    #[tokio::test]
    async fn rejects_truncated_reply() {
        let err = parse("250-ServiceID=abc\r\n").await.unwrap_err();
        assert!(matches!(err, OnionError::Protocol(_)));
    }

    #[tokio::test]
    async fn rejects_unterminated_data_block() {
        let err = parse("250+onions/current=\r\nabc123\r\n").await.unwrap_err();
        assert!(matches!(err, OnionError::Protocol(_)));
    }
}
