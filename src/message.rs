//! Line protocol definitions
//!
//! Inbound lines are parsed into a `Command`; outbound lines are
//! `[tag]body` strings built from an `Outbound`.

use crate::error::ChatError;
use crate::types::Tag;

pub const WHO: &str = "who";
pub const RENAME_PREFIX: &str = "rename|";
pub const DIRECT_PREFIX: &str = "to|";
pub const SEPARATOR: char = '|';

pub const RENAME_USAGE: &str = "rename|张三";
pub const DIRECT_USAGE: &str = "to|张三|你好啊";

/// Onboarding lines sent once to every new session
pub const HELP: [&str; 3] = [
    "发送“rename|{your name}”可以修改昵称,例如“rename|张三”",
    "使用“who”查看当前在线人员",
    "使用“to|张三|你好呀”可发起私聊",
];

pub const ONLINE: &str = "已上线";
pub const OFFLINE: &str = "已下线";
pub const PRESENT: &str = "在线ing";
pub const IDLE_TIMEOUT: &str = "您潜水太久已超时，请重新连接进入";

/// Client → Server command
///
/// One inbound line maps to exactly one command. Precedence follows the
/// order of the variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List online identities
    Who,
    /// Change own identity
    Rename { name: String },
    /// Private message; `body` may be empty and is checked by the router
    /// after the target lookup
    Direct { target: String, body: String },
    /// Blank line
    Empty,
    /// Anything else goes to the hall
    Chat { content: String },
    /// Recognised prefix with an unusable shape
    Malformed { usage: &'static str },
}

impl Command {
    /// Parse one line, already stripped of its terminator
    pub fn parse(line: &str) -> Self {
        if line == WHO {
            return Command::Who;
        }

        if line.len() > RENAME_PREFIX.len() && line.starts_with(RENAME_PREFIX) {
            let rest = &line[RENAME_PREFIX.len()..];
            let name = rest.split(SEPARATOR).next().unwrap_or_default();
            if name.is_empty() {
                return Command::Malformed {
                    usage: RENAME_USAGE,
                };
            }
            return Command::Rename {
                name: name.to_string(),
            };
        }

        if line.len() > DIRECT_PREFIX.len() + 1 && line.starts_with(DIRECT_PREFIX) {
            // Only the first two separators count; the body may contain more
            let mut parts = line[DIRECT_PREFIX.len()..].splitn(2, SEPARATOR);
            let target = parts.next().unwrap_or_default();
            if target.is_empty() {
                return Command::Malformed {
                    usage: DIRECT_USAGE,
                };
            }
            let Some(body) = parts.next() else {
                return Command::Malformed {
                    usage: DIRECT_USAGE,
                };
            };
            return Command::Direct {
                target: target.to_string(),
                body: body.to_string(),
            };
        }

        if line.is_empty() {
            return Command::Empty;
        }

        Command::Chat {
            content: line.to_string(),
        }
    }
}

/// Server → Client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub tag: Tag,
    pub body: String,
}

impl Outbound {
    pub fn new(tag: Tag, body: impl Into<String>) -> Self {
        Self {
            tag,
            body: body.into(),
        }
    }

    pub fn system(body: impl Into<String>) -> Self {
        Self::new(Tag::System, body)
    }

    /// `[tag]sender:body`, the shape of every hall and presence broadcast
    pub fn from_sender(tag: Tag, sender: &str, body: &str) -> Self {
        Self::new(tag, format!("{}:{}", sender, body))
    }

    /// `[私聊]{from}对您说：{body}`
    pub fn private(from: &str, body: &str) -> Self {
        Self::new(Tag::Private, format!("{}对您说：{}", from, body))
    }

    pub fn renamed(name: &str) -> Self {
        Self::system(format!("您已修改用户名为：{}", name))
    }
}

impl std::fmt::Display for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]{}", self.tag, self.body)
    }
}

/// Convert ChatError to a system notice for the requester
impl From<ChatError> for Outbound {
    fn from(err: ChatError) -> Self {
        let body = match &err {
            ChatError::NameConflict(_) => "当前用户名已被占用".to_string(),
            ChatError::NotFound(_) => "该用户名不存在/不在线".to_string(),
            ChatError::MalformedCommand { usage } => {
                format!("消息格式不正确，请使用\"{}\"格式", usage)
            }
            ChatError::EmptyContent => "无消息内容，请重发".to_string(),
            // Connection-level errors end the session rather than being reported
            _ => "服务器内部错误".to_string(),
        };
        Outbound::system(body)
    }
}
