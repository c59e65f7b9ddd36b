//! Byte-level tokenizer distinguishing "inside frame" from "outside
//! frame" (§9): single command bytes (`0x14`/`0x13`/`0x00`) are never
//! wrapped in `<...>`, and framed ASCII text `<TAG:BODY>` is buffered
//! until its closing `>` before being dispatched.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// A single byte observed outside of any `<...>` frame.
    Byte(u8),
    Frame(Frame),
}

/// A parsed `<TAG:BODY>` message (§6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: String,
    pub body: String,
}

impl Frame {
    /// Sensor/button values are truthy unless they fall in the falsy set
    /// named for that tag in §6.1.
    pub fn truthy_value(&self) -> Option<bool> {
        let mut parts = self.body.splitn(2, ':');
        let _name = parts.next()?;
        let value = parts.next()?;

        let falsy: &[&str] = match self.tag.as_str() {
            "SNS" => &["0", "OFF", "FALSE", "false"],
            "BTN" => &["0", "UP", "RELEASED", "OFF"],
            _ => return None,
        };
        Some(!falsy.contains(&value))
    }
}

pub struct Tokenizer {
    in_frame: bool,
    frame_buf: String,
}

impl Tokenizer {
    pub fn new() -> Self {
        Tokenizer {
            in_frame: false,
            frame_buf: String::new(),
        }
    }

    /// Feed newly-read bytes and drain every token they complete.
    /// Partial frames are retained across calls.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Token> {
        let mut tokens = Vec::new();

        for &byte in bytes {
            if self.in_frame {
                if byte == b'>' {
                    if let Some(frame) = parse_frame(&self.frame_buf) {
                        tokens.push(Token::Frame(frame));
                    }
                    self.frame_buf.clear();
                    self.in_frame = false;
                } else {
                    self.frame_buf.push(byte as char);
                }
                continue;
            }

            if byte == b'<' {
                self.in_frame = true;
                self.frame_buf.clear();
                continue;
            }

            tokens.push(Token::Byte(byte));
        }

        tokens
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_frame(buf: &str) -> Option<Frame> {
    let (tag, body) = buf.split_once(':')?;
    if !matches!(tag, "SNS" | "BTN" | "LCD") {
        return None;
    }
    Some(Frame {
        tag: tag.to_string(),
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_bytes_outside_frames() {
        let mut tok = Tokenizer::new();
        let tokens = tok.feed(&[0x14, 0x13, 0x00]);
        assert_eq!(
            tokens,
            vec![Token::Byte(0x14), Token::Byte(0x13), Token::Byte(0x00)]
        );
    }

    #[test]
    fn parses_a_framed_sensor_message() {
        let mut tok = Tokenizer::new();
        let tokens = tok.feed(b"<SNS:pusher:1>");
        assert_eq!(
            tokens,
            vec![Token::Frame(Frame {
                tag: "SNS".into(),
                body: "pusher:1".into()
            })]
        );
    }

    #[test]
    fn frame_split_across_two_feeds_does_not_emit_early() {
        let mut tok = Tokenizer::new();
        assert_eq!(tok.feed(b"<SNS:pus"), vec![]);
        assert_eq!(
            tok.feed(b"her:1>"),
            vec![Token::Frame(Frame {
                tag: "SNS".into(),
                body: "pusher:1".into()
            })]
        );
    }

    #[test]
    fn command_bytes_interleave_with_frames_without_confusion() {
        let mut tok = Tokenizer::new();
        let mut input = vec![0x14];
        input.extend_from_slice(b"<SNS:foo:0>");
        input.push(0x13);
        let tokens = tok.feed(&input);
        assert_eq!(
            tokens,
            vec![
                Token::Byte(0x14),
                Token::Frame(Frame {
                    tag: "SNS".into(),
                    body: "foo:0".into()
                }),
                Token::Byte(0x13),
            ]
        );
    }

    #[test]
    fn truthy_value_for_sensor_and_button() {
        let falsy = Frame {
            tag: "SNS".into(),
            body: "pusher:OFF".into(),
        };
        assert_eq!(falsy.truthy_value(), Some(false));

        let truthy = Frame {
            tag: "BTN".into(),
            body: "estop:PRESSED".into(),
        };
        assert_eq!(truthy.truthy_value(), Some(true));

        let released = Frame {
            tag: "BTN".into(),
            body: "estop:RELEASED".into(),
        };
        assert_eq!(released.truthy_value(), Some(false));
    }
}
