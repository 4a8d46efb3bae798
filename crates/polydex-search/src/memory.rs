//! In-process engine and record store.
//!
//! [`MemoryEngine`] answers the query protocol with a linear scan over
//! documents held in memory. It understands the parts of the protocol the
//! coordinator relies on: word matching, numeric filters, computed
//! `IF(cond, a, b) AS alias` columns, attribute sorts and attribute updates.
//! When the same id is present in several queried indexes, the index listed
//! last wins, which is how a delta twin shadows its primary.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;
use polydex_core::{Error, GlobalDocumentId, Result};

use crate::backend::{EngineMatch, EngineQuery, EngineResponse, EngineSort, SearchEngine};
use crate::record::{Record, RecordStore};

/// One document of a [`MemoryEngine`] index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDocument {
    /// Global document id.
    pub id: GlobalDocumentId,
    /// Full-text content.
    pub text: String,
    /// Numeric attributes.
    pub attributes: BTreeMap<String, u64>,
}

impl MemoryDocument {
    /// Empty document.
    pub fn new(id: GlobalDocumentId) -> Self {
        Self {
            id,
            text: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Append full-text content.
    pub fn with_text(mut self, text: impl AsRef<str>) -> Self {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text.as_ref());
        self
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: u64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Linear-scan engine over in-memory indexes.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    indexes: RwLock<BTreeMap<String, Vec<MemoryDocument>>>,
}

impl MemoryEngine {
    /// Engine without indexes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content of an index, creating it if needed.
    pub fn load_index(&self, index: &str, documents: Vec<MemoryDocument>) -> Result<()> {
        let mut indexes = self
            .indexes
            .write()
            .map_err(|e| Error::operation(format!("engine lock poisoned: {e}")))?;
        indexes.insert(index.to_string(), documents);
        Ok(())
    }

    /// Add or replace one document of an index, creating the index if needed.
    pub fn insert(&self, index: &str, document: MemoryDocument) -> Result<()> {
        let mut indexes = self
            .indexes
            .write()
            .map_err(|e| Error::operation(format!("engine lock poisoned: {e}")))?;
        let documents = indexes.entry(index.to_string()).or_default();
        documents.retain(|d| d.id != document.id);
        documents.push(document);
        Ok(())
    }

    /// Documents of an index, in insertion order.
    pub fn documents(&self, index: &str) -> Result<Vec<MemoryDocument>> {
        let indexes = self
            .indexes
            .read()
            .map_err(|e| Error::operation(format!("engine lock poisoned: {e}")))?;
        Ok(indexes.get(index).cloned().unwrap_or_default())
    }

    /// Names of the loaded indexes.
    pub fn index_names(&self) -> Result<Vec<String>> {
        let indexes = self
            .indexes
            .read()
            .map_err(|e| Error::operation(format!("engine lock poisoned: {e}")))?;
        Ok(indexes.keys().cloned().collect())
    }

    fn run(&self, query: &EngineQuery) -> Result<EngineResponse> {
        let indexes = self
            .indexes
            .read()
            .map_err(|e| Error::operation(format!("engine lock poisoned: {e}")))?;

        let mut merged: BTreeMap<GlobalDocumentId, MemoryDocument> = BTreeMap::new();
        let mut unknown = Vec::new();
        for name in &query.indexes {
            match indexes.get(name) {
                Some(documents) => {
                    for document in documents {
                        merged.insert(document.id, document.clone());
                    }
                }
                None => unknown.push(name.as_str()),
            }
        }
        drop(indexes);

        if !unknown.is_empty() {
            return Ok(EngineResponse {
                error: Some(format!(
                    "unknown local index(es) '{}' in search request",
                    unknown.join("', '")
                )),
                ..Default::default()
            });
        }

        let computed = match query
            .select
            .iter()
            .filter_map(|item| split_alias(item))
            .map(|(expr, alias)| Ok((alias.to_string(), parse_expression(expr)?)))
            .collect::<Result<Vec<(String, Expr)>>>()
        {
            Ok(computed) => computed,
            Err(e) => {
                return Ok(EngineResponse {
                    error: Some(e.to_string()),
                    ..Default::default()
                });
            }
        };

        let terms = words(&query.text);
        let mut missing: BTreeSet<&str> = BTreeSet::new();
        let mut matched: Vec<(usize, MemoryDocument)> = Vec::new();
        'documents: for mut document in merged.into_values() {
            let score = relevance(&terms, &document.text);
            if !terms.is_empty() && score == 0 {
                continue;
            }
            for (alias, expr) in &computed {
                let value = expr.eval(&document.attributes);
                document.attributes.insert(alias.clone(), value);
            }
            for filter in &query.filters {
                let accepted = match document.attributes.get(&filter.attribute) {
                    Some(value) => filter.accepts(*value),
                    None => {
                        missing.insert(&filter.attribute);
                        filter.exclude
                    }
                };
                if !accepted {
                    continue 'documents;
                }
            }
            matched.push((score, document));
        }

        let mut warnings: Vec<String> = missing
            .into_iter()
            .map(|attribute| format!("no such filter attribute '{attribute}'"))
            .collect();

        let keys = match &query.sort {
            EngineSort::Relevance => None,
            EngineSort::Attributes(keys) => Some(keys.clone()),
            EngineSort::Expression(clause) => match parse_sort_clause(clause) {
                Some(keys) => Some(keys),
                None => {
                    warnings.push(format!("unsupported sort clause '{clause}'"));
                    None
                }
            },
        };
        match keys {
            Some(keys) => matched.sort_by(|(_, a), (_, b)| {
                compare_attributes(&keys, a, b).then_with(|| a.id.cmp(&b.id))
            }),
            None => matched.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| a.id.cmp(&b.id))),
        }

        let total = matched.len();
        let matches = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(_, document)| EngineMatch {
                id: document.id,
                attributes: document.attributes,
            })
            .collect();

        Ok(EngineResponse {
            matches,
            total,
            total_found: total,
            warning: (!warnings.is_empty()).then(|| warnings.join("; ")),
            error: None,
        })
    }
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn query(&self, query: &EngineQuery) -> Result<EngineResponse> {
        self.run(query)
    }

    async fn update_attributes(
        &self,
        index: &str,
        attribute: &str,
        values: &[(GlobalDocumentId, u64)],
    ) -> Result<usize> {
        let mut indexes = self
            .indexes
            .write()
            .map_err(|e| Error::operation(format!("engine lock poisoned: {e}")))?;
        let documents = indexes
            .get_mut(index)
            .ok_or_else(|| Error::engine(format!("unknown index '{index}'")))?;

        let mut updated = 0;
        for (id, value) in values {
            if let Some(document) = documents.iter_mut().find(|d| d.id == *id) {
                document.attributes.insert(attribute.to_string(), *value);
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Occurrences of the query terms, zero unless every term occurs.
fn relevance(terms: &[String], text: &str) -> usize {
    if terms.is_empty() {
        return 0;
    }
    let document = words(text);
    let mut score = 0;
    for term in terms {
        let count = document.iter().filter(|w| *w == term).count();
        if count == 0 {
            return 0;
        }
        score += count;
    }
    score
}

fn compare_attributes(keys: &[(String, bool)], a: &MemoryDocument, b: &MemoryDocument) -> Ordering {
    for (name, descending) in keys {
        let left = a.attributes.get(name).copied().unwrap_or(0);
        let right = b.attributes.get(name).copied().unwrap_or(0);
        let ordering = if *descending {
            right.cmp(&left)
        } else {
            left.cmp(&right)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// `Rank DESC, _id ASC` into attribute keys.
fn parse_sort_clause(clause: &str) -> Option<Vec<(String, bool)>> {
    let mut keys = Vec::new();
    for part in clause.split(',') {
        let mut tokens = part.split_whitespace();
        let name = tokens.next()?;
        let descending = match tokens.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => false,
            Some("DESC") => true,
            Some(_) => return None,
        };
        if tokens.next().is_some() || !is_identifier(name) {
            return None;
        }
        keys.push((name.to_string(), descending));
    }
    Some(keys)
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `expr AS alias`; plain column names have no alias.
fn split_alias(item: &str) -> Option<(&str, &str)> {
    let upper = item.to_ascii_uppercase();
    let at = upper.rfind(" AS ")?;
    Some((item[..at].trim(), item[at + 4..].trim()))
}

// ============================================================================
// Select expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(u64),
    Ident(String),
    Open,
    Close,
    Comma,
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Number(u64),
    Attribute(String),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    Equal(Box<Expr>, Box<Expr>),
    NotEqual(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    fn eval(&self, attributes: &BTreeMap<String, u64>) -> u64 {
        match self {
            Expr::Number(n) => *n,
            Expr::Attribute(name) => attributes.get(name).copied().unwrap_or(0),
            Expr::If(cond, then, otherwise) => {
                if cond.eval(attributes) != 0 {
                    then.eval(attributes)
                } else {
                    otherwise.eval(attributes)
                }
            }
            Expr::Equal(a, b) => u64::from(a.eval(attributes) == b.eval(attributes)),
            Expr::NotEqual(a, b) => u64::from(a.eval(attributes) != b.eval(attributes)),
            Expr::And(a, b) => u64::from(a.eval(attributes) != 0 && b.eval(attributes) != 0),
            Expr::Or(a, b) => u64::from(a.eval(attributes) != 0 || b.eval(attributes) != 0),
            Expr::Not(a) => u64::from(a.eval(attributes) == 0),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            ',' => tokens.push(Token::Comma),
            '=' => tokens.push(Token::Equal),
            '!' if chars.next_if(|(_, n)| *n == '=').is_some() => tokens.push(Token::NotEqual),
            '<' if chars.next_if(|(_, n)| *n == '>').is_some() => tokens.push(Token::NotEqual),
            c if c.is_ascii_digit() => {
                let mut end = start + c.len_utf8();
                while let Some((i, d)) = chars.next_if(|(_, d)| d.is_ascii_digit()) {
                    end = i + d.len_utf8();
                }
                let number = text[start..end]
                    .parse()
                    .map_err(|e| Error::parse(format!("bad number in select: {e}")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '@' => {
                let mut end = start + c.len_utf8();
                while let Some((i, d)) =
                    chars.next_if(|(_, d)| d.is_ascii_alphanumeric() || *d == '_')
                {
                    end = i + d.len_utf8();
                }
                tokens.push(Token::Ident(text[start..end].to_string()));
            }
            other => {
                return Err(Error::parse(format!(
                    "unexpected '{other}' in select expression '{text}'"
                )));
            }
        }
    }
    Ok(tokens)
}

fn parse_expression(text: &str) -> Result<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, at: 0 };
    let expr = parser.or()?;
    if parser.at != parser.tokens.len() {
        return Err(Error::parse(format!("trailing input in select expression '{text}'")));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    at: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.at)
    }

    fn keyword(&mut self, word: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case(word) => {
                self.at += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.peek() == Some(&token) {
            self.at += 1;
            Ok(())
        } else {
            Err(Error::parse(format!(
                "expected {token:?} in select expression, found {:?}",
                self.peek()
            )))
        }
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.keyword("OR") {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.not()?;
        while self.keyword("AND") {
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.primary()?;
        match self.peek() {
            Some(Token::Equal) => {
                self.at += 1;
                Ok(Expr::Equal(Box::new(left), Box::new(self.primary()?)))
            }
            Some(Token::NotEqual) => {
                self.at += 1;
                Ok(Expr::NotEqual(Box::new(left), Box::new(self.primary()?)))
            }
            _ => Ok(left),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.tokens.get(self.at).cloned() {
            Some(Token::Number(n)) => {
                self.at += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::Open) => {
                self.at += 1;
                let inner = self.or()?;
                self.expect(Token::Close)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name.eq_ignore_ascii_case("IF") => {
                self.at += 1;
                self.expect(Token::Open)?;
                let cond = self.or()?;
                self.expect(Token::Comma)?;
                let then = self.or()?;
                self.expect(Token::Comma)?;
                let otherwise = self.or()?;
                self.expect(Token::Close)?;
                Ok(Expr::If(Box::new(cond), Box::new(then), Box::new(otherwise)))
            }
            Some(Token::Ident(name)) => {
                self.at += 1;
                Ok(Expr::Attribute(name))
            }
            other => Err(Error::parse(format!(
                "unexpected {other:?} in select expression"
            ))),
        }
    }
}

// ============================================================================
// Record store
// ============================================================================

/// Record store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<(String, u32), Record>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record.
    pub fn insert(&self, record: Record) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|e| Error::storage(format!("store lock poisoned: {e}")))?;
        records.insert((record.type_name.clone(), record.id), record);
        Ok(())
    }

    /// Remove a record. Returns whether it existed.
    pub fn remove(&self, type_name: &str, id: u32) -> Result<bool> {
        let mut records = self
            .records
            .write()
            .map_err(|e| Error::storage(format!("store lock poisoned: {e}")))?;
        Ok(records.remove(&(type_name.to_string(), id)).is_some())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn resolve(&self, type_name: &str, local_id: u32) -> Result<Option<Record>> {
        let records = self
            .records
            .read()
            .map_err(|e| Error::storage(format!("store lock poisoned: {e}")))?;
        Ok(records.get(&(type_name.to_string(), local_id)).cloned())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::EngineFilter;

    fn doc(local: u32, text: &str, rank: u64) -> MemoryDocument {
        MemoryDocument::new(GlobalDocumentId::encode(7, local))
            .with_text(text)
            .with_attribute("_id", u64::from(local))
            .with_attribute("_baseid", 7)
            .with_attribute("Rank", rank)
    }

    fn engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .load_index(
                "Main",
                vec![
                    doc(1, "red apple", 3),
                    doc(2, "green apple apple", 1),
                    doc(3, "red pear", 2),
                ],
            )
            .unwrap();
        engine.load_index("MainDelta", vec![doc(3, "yellow pear", 9)]).unwrap();
        engine
    }

    fn query(text: &str) -> EngineQuery {
        EngineQuery {
            text: text.into(),
            indexes: vec!["Main".into()],
            limit: 20,
            ..Default::default()
        }
    }

    fn ids(response: &EngineResponse) -> Vec<u32> {
        response.matches.iter().map(|m| m.id.local_id()).collect()
    }

    // ------------------------------------------------------------------------
    // Matching and ordering
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_relevance_orders_by_occurrences() {
        let response = engine().query(&query("apple")).await.unwrap();
        assert_eq!(ids(&response), vec![2, 1]);
        assert_eq!(response.total, 2);
        assert!(response.warning.is_none());
    }

    #[tokio::test]
    async fn test_every_term_must_match() {
        let response = engine().query(&query("red APPLE")).await.unwrap();
        assert_eq!(ids(&response), vec![1]);
    }

    #[tokio::test]
    async fn test_attribute_sort_and_window() {
        let mut q = query("");
        q.sort = EngineSort::Attributes(vec![("Rank".into(), true)]);
        q.offset = 1;
        q.limit = 1;
        let response = engine().query(&q).await.unwrap();
        assert_eq!(ids(&response), vec![3]);
        assert_eq!(response.total, 3);
    }

    #[tokio::test]
    async fn test_sort_clause() {
        let mut q = query("");
        q.sort = EngineSort::Expression("Rank ASC".into());
        assert_eq!(ids(&engine().query(&q).await.unwrap()), vec![2, 3, 1]);

        q.sort = EngineSort::Expression("Rank + 1".into());
        let response = engine().query(&q).await.unwrap();
        assert!(response.warning.unwrap().contains("unsupported sort clause"));
    }

    #[tokio::test]
    async fn test_later_index_shadows_earlier() {
        let mut q = query("pear");
        q.indexes.push("MainDelta".into());
        let response = engine().query(&q).await.unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.matches[0].attribute("Rank"), Some(9));
    }

    // ------------------------------------------------------------------------
    // Filters and computed columns
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_filters() {
        let mut q = query("");
        q.filters.push(EngineFilter::require("Rank", vec![1, 2]));
        q.filters.push(EngineFilter::exclude("Rank", vec![2]));
        assert_eq!(ids(&engine().query(&q).await.unwrap()), vec![2]);
    }

    #[tokio::test]
    async fn test_missing_filter_attribute_warns() {
        let mut q = query("");
        q.filters.push(EngineFilter::exclude("_dirty", vec![1]));
        let response = engine().query(&q).await.unwrap();
        assert_eq!(response.total, 3);
        assert_eq!(
            response.warning.as_deref(),
            Some("no such filter attribute '_dirty'")
        );
    }

    #[tokio::test]
    async fn test_computed_column_filter() {
        let mut q = query("");
        q.select = vec![
            "_id".into(),
            "IF(_baseid = 7 AND NOT(Rank = 0 OR Rank = 3), 1, 0) AS Mismatch".into(),
        ];
        q.filters.push(EngineFilter::exclude("Mismatch", vec![1]));
        let response = engine().query(&q).await.unwrap();
        assert_eq!(ids(&response), vec![1]);
        assert_eq!(response.matches[0].attribute("Mismatch"), Some(0));
    }

    #[tokio::test]
    async fn test_bad_select_is_engine_error() {
        let mut q = query("");
        q.select = vec!["IF(Rank = , 1, 0) AS Broken".into()];
        let response = engine().query(&q).await.unwrap();
        assert!(response.error.is_some());
        assert!(response.matches.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_index_is_engine_error() {
        let mut q = query("");
        q.indexes.push("Nope".into());
        let response = engine().query(&q).await.unwrap();
        assert!(response.error.unwrap().contains("'Nope'"));
    }

    // ------------------------------------------------------------------------
    // Updates and the record store
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_update_attributes() {
        let engine = engine();
        let updated = engine
            .update_attributes(
                "Main",
                "_dirty",
                &[
                    (GlobalDocumentId::encode(7, 1), 1),
                    (GlobalDocumentId::encode(7, 99), 1),
                ],
            )
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(engine.documents("Main").unwrap()[0].attributes["_dirty"], 1);

        let err = engine.update_attributes("Nope", "_dirty", &[]).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_store_resolve_and_remove() {
        let store = MemoryStore::new();
        store.insert(Record::new("Page", 4).with_field("Title", "Home")).unwrap();
        let record = store.resolve("Page", 4).await.unwrap().unwrap();
        assert_eq!(record.field("Title"), Some("Home"));
        assert!(store.remove("Page", 4).unwrap());
        assert!(store.resolve("Page", 4).await.unwrap().is_none());
    }
}
