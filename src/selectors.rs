//! Ordered-fallback extraction.
//!
//! A [`Strategy`] is a named function from a parsed document to an optional
//! value. [`resolve`] runs strategies strictly in order and stops at the first
//! non-blank result. Early strategies describe the expected markup precisely,
//! later ones are loose and only exist so that something comes out. Once a
//! result is accepted there is no backtracking; judging its quality is the
//! content filter's job.

use scraper::Html;
use tracing::trace;

/// Values that can be "present but empty".
pub trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T> Blank for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

type StrategyFn<'a, T> = Box<dyn Fn(&Html) -> Option<T> + 'a>;

pub struct Strategy<'a, T> {
    name: String,
    run: StrategyFn<'a, T>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new(name: impl Into<String>, run: impl Fn(&Html) -> Option<T> + 'a) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A chain result together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub strategy: String,
}

/// Evaluate `strategies` in priority order; `None` means the chain is exhausted.
pub fn resolve<T: Blank>(document: &Html, strategies: &[Strategy<'_, T>]) -> Option<Resolved<T>> {
    for strategy in strategies {
        match (strategy.run)(document) {
            Some(value) if !value.is_blank() => {
                trace!(strategy = strategy.name(), "Strategy matched");
                return Some(Resolved {
                    value,
                    strategy: strategy.name().to_string(),
                });
            }
            _ => trace!(strategy = strategy.name(), "Strategy produced nothing"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;
    use std::cell::Cell;

    fn first_text(doc: &Html, css: &str) -> Option<String> {
        let selector = Selector::parse(css).unwrap();
        doc.select(&selector)
            .next()
            .map(|el| el.text().collect::<String>())
    }

    #[test]
    fn test_first_non_blank_strategy_wins() {
        let doc = Html::parse_document("<h1>  </h1><h2>Second</h2><h3>Third</h3>");
        let strategies = vec![
            Strategy::new("missing", |d: &Html| first_text(d, "header")),
            Strategy::new("blank", |d: &Html| first_text(d, "h1")),
            Strategy::new("h2", |d: &Html| first_text(d, "h2")),
            Strategy::new("h3", |d: &Html| first_text(d, "h3")),
        ];

        let resolved = resolve(&doc, &strategies).unwrap();
        assert_eq!(resolved.value, "Second");
        assert_eq!(resolved.strategy, "h2");
    }

    #[test]
    fn test_later_strategies_are_not_evaluated() {
        let doc = Html::parse_document("<p>x</p>");
        let calls = Cell::new(0);
        let strategies = vec![
            Strategy::new("p", |d: &Html| first_text(d, "p")),
            Strategy::new("counter", |_: &Html| {
                calls.set(calls.get() + 1);
                Some("late".to_string())
            }),
        ];

        assert_eq!(resolve(&doc, &strategies).unwrap().value, "x");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_exhausted_chain_is_none() {
        let doc = Html::parse_document("<div></div>");
        let strategies: Vec<Strategy<'_, Vec<String>>> =
            vec![Strategy::new("empty", |_: &Html| Some(Vec::new()))];
        assert!(resolve(&doc, &strategies).is_none());
        assert_eq!(strategies[0].name(), "empty");
    }
}
