//! Minimal RFC 1459 line parser (§6 "IRC wire"). The IRC wire format is
//! tiny enough, and the pacing/challenge/reconnect requirements specific
//! enough, that this crate talks the protocol directly rather than
//! pulling in a generic IRC client library.

#[derive(Debug, PartialEq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

pub fn parse_line(line: &str) -> Option<Message> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }

    let mut rest = line;
    let mut prefix = None;
    if let Some(stripped) = rest.strip_prefix(':') {
        let (p, r) = stripped.split_once(' ')?;
        prefix = Some(p.to_string());
        rest = r.trim_start();
    }

    let (command, mut rest) = match rest.split_once(' ') {
        Some((c, r)) => (c.to_string(), r),
        None => (rest.to_string(), ""),
    };
    if command.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing.to_string());
            break;
        }
        match rest.split_once(' ') {
            Some((p, r)) => {
                params.push(p.to_string());
                rest = r;
            }
            None => {
                params.push(rest.to_string());
                break;
            }
        }
    }

    Some(Message { prefix, command: command.to_uppercase(), params })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_server_notice() {
        let msg = parse_line(":irc.example.net NOTICE * :*** Looking up your hostname...").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("irc.example.net"));
        assert_eq!(msg.command, "NOTICE");
        assert_eq!(msg.params, vec!["*", "*** Looking up your hostname..."]);
    }

    #[test]
    fn parses_ping_with_no_prefix() {
        let msg = parse_line("PING :abc123").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["abc123"]);
    }

    #[test]
    fn parses_numeric_with_multiple_middle_params() {
        let msg = parse_line(":server.net 001 mybot :Welcome to the network").unwrap();
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["mybot", "Welcome to the network"]);
    }

    #[test]
    fn empty_line_is_none() {
        assert!(parse_line("").is_none());
        assert!(parse_line("\r\n").is_none());
    }
}
