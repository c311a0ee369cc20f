//! Inline emphasis markup for thought text.
//!
//! `*bold*` and `_whisper_` runs. Runs do not nest, and a marker with no
//! closing partner turns the rest of the string into literal text.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Emphasis {
    #[default]
    Plain,
    Bold,
    Whisper,
}

impl Emphasis {
    fn from_marker(ch: char) -> Option<Emphasis> {
        match ch {
            '*' => Some(Emphasis::Bold),
            '_' => Some(Emphasis::Whisper),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub emphasis: Emphasis,
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, Emphasis::Plain)
    }

    pub fn new(text: impl Into<String>, emphasis: Emphasis) -> Self {
        Self {
            text: text.into(),
            emphasis,
        }
    }

    pub fn is_bold(&self) -> bool {
        self.emphasis == Emphasis::Bold
    }

    pub fn is_whisper(&self) -> bool {
        self.emphasis == Emphasis::Whisper
    }
}

pub fn parse(raw: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut plain = String::new();
    let mut rest = raw;

    while let Some(ch) = rest.chars().next() {
        let Some(emphasis) = Emphasis::from_marker(ch) else {
            plain.push(ch);
            rest = &rest[ch.len_utf8()..];
            continue;
        };

        let body = &rest[ch.len_utf8()..];
        match body.find(ch) {
            Some(end) => {
                let inner = &body[..end];
                if !inner.is_empty() {
                    flush(&mut out, &mut plain);
                    out.push(Segment::new(inner, emphasis));
                }
                rest = &body[end + ch.len_utf8()..];
            }
            None => {
                plain.push_str(rest);
                rest = "";
            }
        }
    }

    flush(&mut out, &mut plain);
    out
}

fn flush(out: &mut Vec<Segment>, plain: &mut String) {
    if !plain.is_empty() {
        out.push(Segment::plain(std::mem::take(plain)));
    }
}
