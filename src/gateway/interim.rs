//! 临时回复
//!
//! 工具仍在后台执行时，用户的新消息不进模型，而是从按类别、按语言划分的模板池里
//! 随机取一句。每条模板都声明「之前的请求还在处理中」，并带上当前未完成的工具数。

use rand::seq::SliceRandom;
use rand::Rng;

use super::intent::{Category, Locale};

const EN_STATUS: &[&str] = &[
    "I'm still working on your earlier request ({n} {ops} running). I'll report back as soon as it's done.",
    "Yes, I'm here. Your previous request is still in progress with {n} {ops} underway.",
    "I'm still on it! {n} {ops} from your last request in progress.",
];
const EN_GREETING: &[&str] = &[
    "Hi again! I'm still handling your earlier request ({n} {ops} in progress).",
    "Hello! Give me a moment, your previous request is still running ({n} {ops} left).",
];
const EN_QUESTION: &[&str] = &[
    "Good question. I'll get to it once your earlier request is done; {n} {ops} still in progress.",
    "Noted. I'm still finishing your previous request ({n} {ops} running) and will answer right after.",
];
const EN_OTHER: &[&str] = &[
    "Got it. I'm still working on your earlier request with {n} {ops} in progress, then I'll pick this up.",
    "Understood. Your previous request still has {n} {ops} running; I'll handle this next.",
];

const ES_STATUS: &[&str] = &[
    "Sigo aquí. Tu solicitud anterior todavía está en curso: {n} {ops} en ejecución.",
    "Todavía estoy trabajando en tu petición anterior ({n} {ops} en curso). Te aviso en cuanto termine.",
];
const ES_GREETING: &[&str] = &[
    "¡Hola de nuevo! Todavía estoy con tu solicitud anterior ({n} {ops} en curso).",
];
const ES_QUESTION: &[&str] = &[
    "Buena pregunta. Todavía estoy terminando tu solicitud anterior ({n} {ops} en curso) y luego te respondo.",
];
const ES_OTHER: &[&str] = &[
    "Entendido. Todavía hay {n} {ops} de tu solicitud anterior en curso; después me ocupo de esto.",
];

const ZH_STATUS: &[&str] = &[
    "我还在处理你之前的请求，还有 {n} 项操作在进行中，完成后马上告诉你。",
    "在的！上一个请求还在执行，目前有 {n} 项操作未完成。",
];
const ZH_GREETING: &[&str] = &["你好！我还在处理你之前的请求（{n} 项操作进行中）。"];
const ZH_QUESTION: &[&str] = &["好问题。之前的请求还在处理中（{n} 项操作未完成），完成后就回答你。"];
const ZH_OTHER: &[&str] = &["收到。之前的请求还在进行中（{n} 项操作），之后我来处理这条。"];

/// 给定类别与语言的模板池（非空）
pub fn templates(category: Category, locale: Locale) -> &'static [&'static str] {
    use Category::*;
    match (locale, category) {
        (Locale::En, StatusCheck) => EN_STATUS,
        (Locale::En, Greeting) => EN_GREETING,
        (Locale::En, Question) => EN_QUESTION,
        (Locale::En, Other) => EN_OTHER,
        (Locale::Es, StatusCheck) => ES_STATUS,
        (Locale::Es, Greeting) => ES_GREETING,
        (Locale::Es, Question) => ES_QUESTION,
        (Locale::Es, Other) => ES_OTHER,
        (Locale::Zh, StatusCheck) => ZH_STATUS,
        (Locale::Zh, Greeting) => ZH_GREETING,
        (Locale::Zh, Question) => ZH_QUESTION,
        (Locale::Zh, Other) => ZH_OTHER,
    }
}

fn operations_word(locale: Locale, n: usize) -> &'static str {
    match (locale, n == 1) {
        (Locale::En, true) => "operation",
        (Locale::En, false) => "operations",
        (Locale::Es, true) => "operación",
        (Locale::Es, false) => "operaciones",
        (Locale::Zh, _) => "",
    }
}

fn render(template: &str, locale: Locale, pending_count: usize) -> String {
    template
        .replace("{n}", &pending_count.to_string())
        .replace("{ops}", operations_word(locale, pending_count))
}

/// 临时回复选择器
#[derive(Debug, Clone, Copy, Default)]
pub struct InterimReplySelector;

impl InterimReplySelector {
    pub fn new() -> Self {
        Self
    }

    /// 按用户文本的语言挑选一条回复
    pub fn select(&self, category: Category, text: &str, pending_count: usize) -> String {
        self.select_with(&mut rand::thread_rng(), category, Locale::detect(text), pending_count)
    }

    pub fn select_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        category: Category,
        locale: Locale,
        pending_count: usize,
    ) -> String {
        let pool = templates(category, locale);
        let template = pool.choose(rng).copied().unwrap_or(EN_OTHER[0]);
        render(template, locale, pending_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CATEGORIES: [Category; 4] = [
        Category::StatusCheck,
        Category::Greeting,
        Category::Question,
        Category::Other,
    ];

    #[test]
    fn every_template_reports_the_count() {
        for locale in [Locale::En, Locale::Es, Locale::Zh] {
            for category in CATEGORIES {
                for template in templates(category, locale) {
                    for n in 1..=4 {
                        let out = render(template, locale, n);
                        assert!(out.contains(&n.to_string()), "{out}");
                        assert!(!out.contains('{'), "{out}");
                    }
                }
            }
        }
    }

    #[test]
    fn every_template_says_work_is_ongoing() {
        let markers = [(Locale::En, "still"), (Locale::Es, "odavía"), (Locale::Zh, "还")];
        for (locale, marker) in markers {
            for category in CATEGORIES {
                for template in templates(category, locale) {
                    assert!(template.contains(marker), "{template}");
                }
            }
        }
    }

    #[test]
    fn singular_and_plural_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        let selector = InterimReplySelector::new();
        let one = selector.select_with(&mut rng, Category::StatusCheck, Locale::En, 1);
        assert!(one.contains("1 operation"));
        assert!(!one.contains("operations"));
        let many = selector.select_with(&mut rng, Category::StatusCheck, Locale::En, 3);
        assert!(many.contains("3 operations"));
    }

    #[test]
    fn selection_follows_the_user_language() {
        let selector = InterimReplySelector::new();
        assert!(selector.select(Category::StatusCheck, "还在吗", 2).contains("还"));
        assert!(selector
            .select(Category::StatusCheck, "¿sigues ahí?", 2)
            .contains("odavía"));
    }
}
