//! Slot kinds: the three independently loadable capabilities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A named capability holding at most one loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Chat,
    Image,
    Vision,
}

impl SlotKind {
    pub const ALL: [SlotKind; 3] = [SlotKind::Chat, SlotKind::Image, SlotKind::Vision];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Image => "image",
            Self::Vision => "vision",
        }
    }

    /// Capitalized name used in user-facing messages.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Chat => "Chat",
            Self::Image => "Image",
            Self::Vision => "Vision",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Chat => 0,
            Self::Image => 1,
            Self::Vision => 2,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "image" => Ok(Self::Image),
            "vision" => Ok(Self::Vision),
            other => Err(CoreError::Validation(format!(
                "Invalid model type '{}': expected one of chat, image, vision",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        for kind in SlotKind::ALL {
            assert_eq!(kind.as_str().parse::<SlotKind>().unwrap(), kind);
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "audio".parse::<SlotKind>().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("audio"));
    }

    #[test]
    fn indices_are_distinct() {
        let mut seen = [false; 3];
        for kind in SlotKind::ALL {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
    }
}
