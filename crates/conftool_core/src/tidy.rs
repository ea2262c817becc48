use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

/// One replacement rule; `pattern` captures the surrounding text that the
/// replacement template restores.
pub struct Rule {
    pub name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

/// Outcome of a tidy pass: the rewritten body plus per-rule match counts.
pub struct TidyOutcome {
    pub body: String,
    pub applied: Vec<(&'static str, usize)>,
}

impl TidyOutcome {
    pub fn changed(&self, original: &str) -> bool {
        self.body != original
    }
}

const TOC_MACRO: &str = r#"
          <ac:structured-macro ac:name="panel" ac:schema-version="1">
            <ac:parameter ac:name="title">Contents</ac:parameter>
            <ac:rich-text-body>
              <p>
                <ac:structured-macro ac:name="toc" ac:schema-version="1"/>
              </p>
            </ac:rich-text-body>
          </ac:structured-macro>"#;

/// Ordered markup cleanup rules; order is significant.
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Cleanup rules for pages migrated by cut&paste from FosWiki.
    pub fn standard() -> Self {
        let table: &[(&'static str, &'static str, &'static str)] = &[
            (
                "FosWiki: Remove static section numbering",
                r#"(<h.>)[0-9.]+ ?(<span class="tok">&nbsp;</span>)"#,
                "${1}${2}",
            ),
            (
                "FosWiki: 'tok' spans in front of headers",
                r#"(<h.>)<span class="tok">&nbsp;</span>"#,
                "${1}",
            ),
            (
                "FosWiki: Section edit icons at the end of headers",
                r#" *<a href="[^"]+"><ac:image [^>]+><ri:url ri:value="[^"]+/EditChapterPlugin/pencil.png" ?/></ac:image></a>(</span></h)"#,
                "${1}",
            ),
            (
                "FosWiki: 'Edit Chapter Plugin' spans",
                r#"(<h.>)<span class="ecpHeading">([^<]+)</span>(</h.>)"#,
                "${1}${2}${3}",
            ),
            (
                "FosWiki: Residual leading whitespace in headers",
                r"(<h.>) +",
                "${1}",
            ),
            (
                "FosWiki: Replace TOC div with macro",
                r#"(<a name="foswikiTOC" ?/>)?<div class="foswikiToc">.*?</div>"#,
                TOC_MACRO,
            ),
        ];
        let rules = table
            .iter()
            .map(|&(name, pattern, replacement)| Rule {
                name,
                pattern: Regex::new(pattern).expect("tidy rule pattern"),
                replacement,
            })
            .collect();
        Self { rules }
    }

    /// Apply every rule in order and report what matched.
    pub fn apply(&self, body: &str) -> TidyOutcome {
        let mut tidied = body.to_string();
        let mut applied = Vec::new();
        for rule in &self.rules {
            let count = rule.pattern.find_iter(&tidied).count();
            if count == 0 {
                continue;
            }
            tidied = rule
                .pattern
                .replace_all(&tidied, rule.replacement)
                .into_owned();
            info!("replaced {count} match(es) of \"{}\"", rule.name);
            applied.push((rule.name, count));
        }
        TidyOutcome {
            body: tidied,
            applied,
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

static STRUCTURED_MACRO: OnceLock<Regex> = OnceLock::new();

/// Names of the structured macros used in a storage-format body, in order
/// of appearance.
pub fn macro_names(body: &str) -> Vec<String> {
    let pattern = STRUCTURED_MACRO.get_or_init(|| {
        Regex::new(r#"<ac:structured-macro[^>]*\bac:name="([^"]+)""#).expect("macro pattern")
    });
    pattern
        .captures_iter(body)
        .map(|captures| captures[1].to_string())
        .collect()
}
