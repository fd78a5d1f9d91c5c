//! 消息分类
//!
//! 只在需要本地合成临时回复时使用：把任意文本映射到
//! StatusCheck / Greeting / Question / Other 之一。纯函数、无副作用、全覆盖，
//! 匹配顺序固定（状态询问 > 问候 > 提问），落空即 Other。
//! 关键词覆盖英语、西班牙语与中文。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 消息类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// 「还在吗」「进度如何」之类
    StatusCheck,
    Greeting,
    Question,
    Other,
}

impl Category {
    /// 工具排空后是否需要把这条文本重新交给模型。
    /// 状态询问与问候已被临时回复完整应答，不再重放。
    pub fn replay_after_drain(self) -> bool {
        matches!(self, Category::Question | Category::Other)
    }
}

/// 回复语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Es,
    Zh,
}

impl Locale {
    /// 含 CJK 字符视为中文；出现西语标点或常见词视为西语；其余英语
    pub fn detect(text: &str) -> Locale {
        if text.chars().any(is_cjk) {
            return Locale::Zh;
        }
        if text.contains('¿') || text.contains('¡') || patterns().spanish.is_match(text) {
            return Locale::Es;
        }
        Locale::En
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

struct Patterns {
    status: Regex,
    greeting: Regex,
    question: Regex,
    spanish: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        status: build(&[
            r"(?i)\b(?:still there|are you there|you there|still working|still running",
            r"|any (?:update|news|progress)|status|progress|how long|done yet|ready yet",
            r"|is it (?:done|ready|finished)|what'?s taking|taking so long",
            r"|sigues ahí|sigues ahi|estás ahí|estas ahi|cuánto falta|cuanto falta",
            r"|ya terminaste|ya está|ya esta|progreso|todavía no|todavia no)\b",
            r"|还在吗|在吗|进度|好了吗|完成了吗|还要多久|怎么样了|状态",
        ]),
        greeting: build(&[
            r"(?i)^\s*(?:(?:hi|hello|hey|howdy|good (?:morning|afternoon|evening)",
            r"|hola|buenos d[ií]as|buenas tardes|buenas noches|buenas)\b",
            r"|你好|您好|嗨|早上好|晚上好)",
        ]),
        question: build(&[
            r"[?？]\s*$|^\s*¿",
            r"|(?i)^\s*(?:what|why|how|when|where|who|which|can|could|would|will|is|are",
            r"|do|does|did|should|qué|cómo|cuándo|dónde|quién|cuál|por qué)\b",
            r"|[吗呢]\s*$|什么|为什么|怎么|哪",
        ]),
        spanish: build(&[
            r"(?i)\b(?:hola|gracias|por favor|qué|cómo|cuándo|dónde|todavía|sigues|estás|buenos|buenas)\b",
        ]),
    })
}

fn build(parts: &[&str]) -> Regex {
    Regex::new(&parts.concat()).unwrap_or_else(|e| panic!("invalid classifier pattern: {e}"))
}

/// 对文本分类；空文本为 Other
pub fn classify(text: &str) -> Category {
    let text = text.trim();
    if text.is_empty() {
        return Category::Other;
    }
    let p = patterns();
    if p.status.is_match(text) {
        Category::StatusCheck
    } else if p.greeting.is_match(text) {
        Category::Greeting
    } else if p.question.is_match(text) {
        Category::Question
    } else {
        Category::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_checks_win_over_questions() {
        assert_eq!(classify("are you still there?"), Category::StatusCheck);
        assert_eq!(classify("How long will this take?"), Category::StatusCheck);
        assert_eq!(classify("¿Sigues ahí?"), Category::StatusCheck);
        assert_eq!(classify("还在吗？"), Category::StatusCheck);
    }

    #[test]
    fn greetings_only_at_start() {
        assert_eq!(classify("Hello!"), Category::Greeting);
        assert_eq!(classify("hola, buenas"), Category::Greeting);
        assert_eq!(classify("你好"), Category::Greeting);
        assert_eq!(classify("this is fine"), Category::Other);
    }

    #[test]
    fn questions_by_marker_or_leading_word() {
        assert_eq!(classify("what is the capital of France"), Category::Question);
        assert_eq!(classify("the weather tomorrow?"), Category::Question);
        assert_eq!(classify("¿Qué hora es"), Category::Question);
        assert_eq!(classify("今天天气怎么样"), Category::Question);
    }

    #[test]
    fn everything_else_is_other() {
        assert_eq!(classify(""), Category::Other);
        assert_eq!(classify("   "), Category::Other);
        assert_eq!(classify("ok thanks"), Category::Other);
        assert_eq!(classify("Ship it."), Category::Other);
    }

    #[test]
    fn replay_policy_by_category() {
        assert!(!Category::StatusCheck.replay_after_drain());
        assert!(!Category::Greeting.replay_after_drain());
        assert!(Category::Question.replay_after_drain());
        assert!(Category::Other.replay_after_drain());
    }

    #[test]
    fn locale_detection() {
        assert_eq!(Locale::detect("还在吗"), Locale::Zh);
        assert_eq!(Locale::detect("¿Sigues ahí?"), Locale::Es);
        assert_eq!(Locale::detect("hola amigo"), Locale::Es);
        assert_eq!(Locale::detect("are you there"), Locale::En);
    }
}
