use serde::{Deserialize, Serialize};

/// One point of a stroke path, in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One continuous pen-down-to-pen-up path with a fixed color and thickness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub color: String,
    pub thickness: f32,
    pub path: Vec<Point>,
}

/// One chat or guess line, replayed in append order to late joiners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub author: String,
    pub text: String,
    pub at: i64,
}

impl ChatEntry {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            at: chrono::Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_round_trip() {
        let stroke = Stroke {
            color: "#ff0000".into(),
            thickness: 4.0,
            path: vec![Point { x: 0.0, y: 0.0 }, Point { x: 10.5, y: 3.25 }],
        };
        let json = serde_json::to_string(&stroke).unwrap();
        let back: Stroke = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stroke);
    }

    #[test]
    fn test_chat_entry_carries_author_and_text() {
        let entry = ChatEntry::new("alice", "is it a cat?");
        assert_eq!(entry.author, "alice");
        assert_eq!(entry.text, "is it a cat?");
        assert!(entry.at > 0);
    }
}
