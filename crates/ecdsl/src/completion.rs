//! Completion candidates for a cursor position.
//!
//! The site under the cursor is classified from the token stream before it:
//! the chain of open blocks says which definition kind's statements are
//! valid, and the tokens of the current statement say which keyword or
//! reference kind comes next. Reference candidates come from the linked
//! symbol table, the document's import aliases and the definitions already
//! present in the (possibly unlinked) buffer.
//!
//! The document is usually incomplete while the user types, so nothing here
//! relies on it parsing cleanly.

use std::collections::HashSet;

use ecdsl_core::{kind::DefinitionKind, path::DocumentPath, version::compare_versions};
use ecdsl_parser::{
    ErrorCode,
    lexer::tokenize,
    syntax::DomainSection,
    tokens::{PositionedToken, Token},
};

use crate::{
    fields::Expected,
    scope::{Symbol, SymbolTable},
};

/// What a completion item inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    Keyword,
    /// A definition name.
    Reference(DefinitionKind),
    /// A definition template.
    Snippet,
    Annotation,
    Version,
    /// Another document, for an import's `from` clause.
    Module,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
    /// Text to insert when it differs from `label`.
    pub insert_text: Option<String>,
}

impl CompletionItem {
    fn new(label: impl Into<String>, kind: CompletionKind) -> Self {
        Self {
            label: label.into(),
            kind,
            detail: None,
            insert_text: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn with_insert_text(mut self, text: impl Into<String>) -> Self {
        self.insert_text = Some(text.into());
        self
    }
}

const COMMON_STATEMENTS: [&str; 7] = [
    "version",
    "name",
    "summary",
    "owner",
    "deprecated",
    "draft",
    "schema",
];

const FLAG_STATEMENTS: [&str; 4] = ["deprecated", "draft", "authoritative", "aggregate-root"];

const PARAMETER_FIELDS: [&str; 4] = ["description", "default", "enum", "examples"];

const CONTRACT_FIELDS: [&str; 3] = ["path", "name", "type"];

const KNOWN_ANNOTATIONS: [(&str, &str); 6] = [
    ("badge", "Add a visual badge to the resource"),
    ("note", "Add a developer note or reminder"),
    ("repository", "Link to a source code repository"),
    ("specifications", "Add specification links"),
    ("externalId", "Set an external identifier"),
    ("tag", "Add a tag to the resource"),
];

const SNIPPET_KINDS: [DefinitionKind; 8] = [
    DefinitionKind::Service,
    DefinitionKind::Event,
    DefinitionKind::Command,
    DefinitionKind::Query,
    DefinitionKind::Domain,
    DefinitionKind::Container,
    DefinitionKind::Actor,
    DefinitionKind::ExternalSystem,
];

fn statement_keywords(kind: DefinitionKind) -> &'static [&'static str] {
    match kind {
        DefinitionKind::Domain => &[
            "service",
            "subdomain",
            "entity",
            "container",
            "channel",
            "flow",
            "data-product",
            "sends",
            "receives",
            "owns",
        ],
        DefinitionKind::Service => &[
            "sends",
            "receives",
            "writes-to",
            "reads-from",
            "reads-writes",
            "entity",
            "owns",
        ],
        DefinitionKind::Channel => &["address", "protocol", "route", "parameter"],
        DefinitionKind::Entity => &["owns", "identifier", "aggregate-root"],
        DefinitionKind::Container => &[
            "container-type",
            "technology",
            "authoritative",
            "access-mode",
            "classification",
            "residency",
            "retention",
            "reads-from",
            "writes-to",
        ],
        DefinitionKind::Flow => &["when"],
        DefinitionKind::Actor | DefinitionKind::ExternalSystem => &["uses"],
        DefinitionKind::User => &["email", "role", "avatar", "team", "owns"],
        DefinitionKind::Team => &["email", "slack", "member", "owns"],
        DefinitionKind::DataProduct => &["input", "output"],
        DefinitionKind::Event
        | DefinitionKind::Command
        | DefinitionKind::Query
        | DefinitionKind::Diagram => &[],
    }
}

fn kind_description(kind: DefinitionKind) -> &'static str {
    match kind {
        DefinitionKind::Domain => "Top-level bounded context",
        DefinitionKind::Service => "Microservice or application",
        DefinitionKind::Event => "Domain event",
        DefinitionKind::Command => "Command message",
        DefinitionKind::Query => "Query message",
        DefinitionKind::Channel => "Communication channel",
        DefinitionKind::Entity => "Domain entity",
        DefinitionKind::Container => "Data container (database, cache, etc.)",
        DefinitionKind::Flow => "Process flow definition",
        DefinitionKind::Actor => "Human actor (for flows)",
        DefinitionKind::ExternalSystem => "External system (for flows)",
        DefinitionKind::User => "User definition",
        DefinitionKind::Team => "Team definition",
        DefinitionKind::Diagram => "Architecture diagram",
        DefinitionKind::DataProduct => "Analytical data product",
    }
}

fn snippet(kind: DefinitionKind) -> String {
    let keyword = kind.keyword();
    match kind {
        DefinitionKind::Actor | DefinitionKind::ExternalSystem => format!(
            "{keyword} ${{1:Name}} {{\n  name \"${{2:Display Name}}\"\n  summary \"${{3}}\"\n}}"
        ),
        _ => format!(
            "{keyword} ${{1:Name}} {{\n  version ${{2:0.0.1}}\n  summary \"${{3}}\"\n  $0\n}}"
        ),
    }
}

/// Block kinds the cursor can be nested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Definition(DefinitionKind),
    Import,
    Parameter,
    /// Body of a data product `output`.
    Output,
    Contract,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CompletionSite {
    TopLevel,
    Statement(DefinitionKind),
    Keywords(Vec<&'static str>),
    Reference {
        expected: Expected,
        keywords: Vec<&'static str>,
    },
    Annotation,
    Version {
        name: String,
    },
    ImportNames,
    ModulePath {
        quoted: bool,
    },
    Nothing,
}

fn reference(expected: Expected) -> CompletionSite {
    CompletionSite::Reference {
        expected,
        keywords: Vec::new(),
    }
}

fn reference_of(kind: DefinitionKind) -> CompletionSite {
    reference(Expected::Kind(kind))
}

/// Completion candidates at byte offset `cursor` of `source`, the text of
/// the document at `path`.
pub fn complete(
    source: &str,
    cursor: usize,
    path: &DocumentPath,
    table: &SymbolTable,
) -> Vec<CompletionItem> {
    let mut cursor = cursor.min(source.len());
    while !source.is_char_boundary(cursor) {
        cursor -= 1;
    }
    let before = &source[..cursor];

    let (site, prefix) = classify_site(before);
    let items = dispatch(&site, source, path, table);
    post_pass(items, &prefix)
}

fn classify_site(before: &str) -> (CompletionSite, String) {
    let (tokens, diagnostics) = tokenize(before);

    if let Some(last) = tokens.last() {
        if last.span.end() == before.len() {
            match &last.token {
                Token::LineComment(_) => return (CompletionSite::Nothing, String::new()),
                Token::BlockComment(_) if !before.ends_with("*/") => {
                    return (CompletionSite::Nothing, String::new());
                }
                _ => {}
            }
        }
    }

    let open_string = diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.code() == Some(ErrorCode::E001))
        .filter_map(|diagnostic| diagnostic.primary_span())
        .find(|span| span.end() == before.len());
    if let Some(string) = open_string {
        let head = tokens
            .iter()
            .filter(|token| !token.token.is_trivia() && token.span.end() <= string.start())
            .last();
        let after_from = head.is_some_and(|token| token.token.as_identifier() == Some("from"));
        let site = if after_from {
            CompletionSite::ModulePath { quoted: true }
        } else {
            CompletionSite::Nothing
        };
        let typed = before.get(string.start() + 1..).unwrap_or_default();
        return (site, typed.to_string());
    }

    let word_start = before
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .last()
        .map_or(before.len(), |(i, _)| i);
    let prefix = before[word_start..].to_string();

    let significant: Vec<&PositionedToken<'_>> = tokens
        .iter()
        .filter(|token| !token.token.is_trivia())
        .collect();

    if before[..word_start].ends_with('@') {
        let at = word_start - 1;
        let previous = significant
            .iter()
            .filter(|token| token.span.end() <= at)
            .last();
        let site = match previous {
            Some(token) if token.span.end() == at => match &token.token {
                Token::Identifier(name) => CompletionSite::Version {
                    name: (*name).to_string(),
                },
                Token::StringLiteral(name) => CompletionSite::Version { name: name.clone() },
                _ => CompletionSite::Annotation,
            },
            _ => CompletionSite::Annotation,
        };
        return (site, prefix);
    }

    let context: Vec<&PositionedToken<'_>> = significant
        .into_iter()
        .filter(|token| token.span.end() <= word_start)
        .collect();
    (classify_tokens(before, &context, word_start), prefix)
}

fn line_break_between(text: &str, start: usize, end: usize) -> bool {
    text.get(start..end).is_some_and(|gap| gap.contains('\n'))
}

/// Walk the tokens before the cursor, tracking open blocks and the tokens of
/// the current statement.
fn classify_tokens(
    before: &str,
    tokens: &[&PositionedToken<'_>],
    word_start: usize,
) -> CompletionSite {
    let mut stack: Vec<Block> = Vec::new();
    let mut statement: Vec<&PositionedToken<'_>> = Vec::new();
    let mut previous_end: Option<usize> = None;

    for token in tokens {
        if previous_end.is_some_and(|end| line_break_between(before, end, token.span.start())) {
            statement.clear();
        }
        previous_end = Some(token.span.end());

        match token.token {
            Token::LeftBrace => {
                let block = open_block(stack.last().copied(), &statement);
                stack.push(block);
                statement.clear();
            }
            Token::RightBrace => {
                stack.pop();
                statement.clear();
            }
            _ => statement.push(token),
        }
    }
    if previous_end.is_some_and(|end| line_break_between(before, end, word_start)) {
        statement.clear();
    }

    let words: Vec<Option<&str>> = statement
        .iter()
        .map(|token| token.token.as_identifier())
        .collect();

    match stack.last() {
        None => match words.as_slice() {
            [] => CompletionSite::TopLevel,
            [.., Some("from")] => CompletionSite::ModulePath { quoted: false },
            _ => CompletionSite::Nothing,
        },
        Some(Block::Import) => match words.last() {
            Some(Some("as")) => CompletionSite::Nothing,
            _ => CompletionSite::ImportNames,
        },
        Some(Block::Parameter) if words.is_empty() => {
            CompletionSite::Keywords(PARAMETER_FIELDS.to_vec())
        }
        Some(Block::Output) if words.is_empty() => CompletionSite::Keywords(vec!["contract"]),
        Some(Block::Contract) if words.is_empty() => {
            CompletionSite::Keywords(CONTRACT_FIELDS.to_vec())
        }
        Some(Block::Definition(kind)) => statement_site(*kind, &statement, &words),
        Some(_) => CompletionSite::Nothing,
    }
}

fn open_block(parent: Option<Block>, head: &[&PositionedToken<'_>]) -> Block {
    let first = head.first().and_then(|token| token.token.as_identifier());
    let second = head.get(1).and_then(|token| token.token.as_identifier());

    match (parent, first) {
        (_, Some("import")) => Block::Import,
        (None, Some(word)) => DefinitionKind::from_keyword(word).map_or(Block::Other, Block::Definition),
        (Some(Block::Definition(DefinitionKind::Channel)), Some("parameter")) => Block::Parameter,
        (Some(Block::Definition(DefinitionKind::DataProduct)), Some("output")) => Block::Output,
        (Some(Block::Output), Some("contract")) => Block::Contract,
        (
            Some(Block::Definition(DefinitionKind::Domain | DefinitionKind::Service)),
            Some("sends" | "receives"),
        ) => second
            .and_then(DefinitionKind::from_keyword)
            .filter(|kind| kind.is_message())
            .map_or(Block::Other, Block::Definition),
        (Some(Block::Definition(DefinitionKind::Domain)), Some(word)) => DomainSection::from_keyword(word)
            .map_or(Block::Other, |section| Block::Definition(section.kind())),
        _ => Block::Other,
    }
}

fn statement_site(
    kind: DefinitionKind,
    statement: &[&PositionedToken<'_>],
    words: &[Option<&str>],
) -> CompletionSite {
    let Some(last) = statement.last() else {
        return CompletionSite::Statement(kind);
    };
    let first = words.first().copied().flatten();
    let kind_at = |index: usize| {
        words
            .get(index)
            .copied()
            .flatten()
            .and_then(DefinitionKind::from_keyword)
    };

    if kind == DefinitionKind::Flow {
        return match (&last.token, first) {
            (Token::Arrow, _) => reference(Expected::Any),
            (Token::Identifier("when" | "and"), _) => reference(Expected::Any),
            (Token::Identifier(_), Some("when")) => CompletionSite::Keywords(vec!["and"]),
            _ => CompletionSite::Nothing,
        };
    }

    let len = statement.len();
    let last_word = last.token.as_identifier();
    let messages = matches!(kind, DefinitionKind::Domain | DefinitionKind::Service);

    match (kind, first, len) {
        (_, Some("sends" | "receives"), 1) if messages => CompletionSite::Keywords(
            DefinitionKind::MESSAGES.iter().map(|kind| kind.keyword()).collect(),
        ),
        (_, Some("sends" | "receives"), 2) if messages => kind_at(1)
            .filter(|kind| kind.is_message())
            .map_or(CompletionSite::Nothing, reference_of),
        (_, Some("sends"), 3) if messages => CompletionSite::Keywords(vec!["to"]),
        (_, Some("receives"), 3) if messages => CompletionSite::Keywords(vec!["from"]),
        (_, Some("sends" | "receives"), _)
            if messages
                && (matches!(last.token, Token::Comma)
                    || matches!(last_word, Some("to" | "from"))) =>
        {
            reference_of(DefinitionKind::Channel)
        }
        (_, Some("owns"), 1) | (DefinitionKind::DataProduct, Some("input" | "output"), 1) => {
            CompletionSite::Keywords(DefinitionKind::ALL.iter().map(|kind| kind.keyword()).collect())
        }
        (_, Some("owns"), 2) | (DefinitionKind::DataProduct, Some("input" | "output"), 2) => {
            kind_at(1).map_or(CompletionSite::Nothing, reference_of)
        }
        (DefinitionKind::Domain, Some(word), 1) => DomainSection::from_keyword(word)
            .map_or(CompletionSite::Nothing, |section| reference_of(section.kind())),
        (DefinitionKind::Service, Some("writes-to" | "reads-from" | "reads-writes"), 1) => {
            CompletionSite::Reference {
                expected: Expected::Kind(DefinitionKind::Container),
                keywords: vec!["container"],
            }
        }
        (DefinitionKind::Service, Some("writes-to" | "reads-from" | "reads-writes"), 2)
            if last_word == Some("container") =>
        {
            reference_of(DefinitionKind::Container)
        }
        (DefinitionKind::Container, Some("writes-to" | "reads-from"), 1) => {
            CompletionSite::Reference {
                expected: Expected::Kind(DefinitionKind::Service),
                keywords: vec!["service"],
            }
        }
        (DefinitionKind::Container, Some("writes-to" | "reads-from"), 2)
            if last_word == Some("service") =>
        {
            reference_of(DefinitionKind::Service)
        }
        (DefinitionKind::Service, Some("entity"), 1) => reference_of(DefinitionKind::Entity),
        (DefinitionKind::Channel, Some("route"), 1) => reference_of(DefinitionKind::Channel),
        (DefinitionKind::Actor | DefinitionKind::ExternalSystem, Some("uses"), 1) => {
            reference(Expected::Any)
        }
        (DefinitionKind::User, Some("team"), 1) => reference_of(DefinitionKind::Team),
        (DefinitionKind::Team, Some("member"), 1) => reference_of(DefinitionKind::User),
        (_, Some(word), 1) if FLAG_STATEMENTS.contains(&word) => {
            CompletionSite::Keywords(vec!["true", "false"])
        }
        _ => CompletionSite::Nothing,
    }
}

fn dispatch(
    site: &CompletionSite,
    source: &str,
    path: &DocumentPath,
    table: &SymbolTable,
) -> Vec<CompletionItem> {
    match site {
        CompletionSite::TopLevel => {
            let mut items: Vec<CompletionItem> = DefinitionKind::ALL
                .iter()
                .map(|kind| {
                    CompletionItem::new(kind.keyword(), CompletionKind::Keyword)
                        .with_detail(kind_description(*kind))
                })
                .collect();
            items.push(
                CompletionItem::new("import", CompletionKind::Keyword)
                    .with_detail("Import definitions from another document"),
            );
            items.extend(SNIPPET_KINDS.iter().map(|kind| {
                CompletionItem::new(format!("{} (block)", kind.keyword()), CompletionKind::Snippet)
                    .with_detail(kind_description(*kind))
                    .with_insert_text(snippet(*kind))
            }));
            items
        }
        CompletionSite::Statement(kind) => COMMON_STATEMENTS
            .iter()
            .chain(statement_keywords(*kind))
            .map(|keyword| CompletionItem::new(*keyword, CompletionKind::Keyword))
            .collect(),
        CompletionSite::Keywords(keywords) => keywords
            .iter()
            .map(|keyword| CompletionItem::new(*keyword, CompletionKind::Keyword))
            .collect(),
        CompletionSite::Reference { expected, keywords } => {
            let mut items: Vec<CompletionItem> = keywords
                .iter()
                .map(|keyword| CompletionItem::new(*keyword, CompletionKind::Keyword))
                .collect();
            items.extend(reference_items(*expected, source, path, table));
            items
        }
        CompletionSite::Annotation => KNOWN_ANNOTATIONS
            .iter()
            .map(|(name, description)| {
                CompletionItem::new(*name, CompletionKind::Annotation).with_detail(*description)
            })
            .collect(),
        CompletionSite::Version { name } => version_items(name, table),
        CompletionSite::ImportNames => import_items(path, table),
        CompletionSite::ModulePath { quoted } => module_items(path, table, *quoted),
        CompletionSite::Nothing => Vec::new(),
    }
}

fn reference_items(
    expected: Expected,
    source: &str,
    path: &DocumentPath,
    table: &SymbolTable,
) -> Vec<CompletionItem> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut items = Vec::new();
    let mut push = |name: &str, kind: DefinitionKind, detail: String| {
        if expected.accepts(kind) && seen.insert(name.to_string()) {
            items.push(
                CompletionItem::new(name, CompletionKind::Reference(kind)).with_detail(detail),
            );
        }
    };

    if let Some(document) = table.document_id(path) {
        for (local, binding) in table.imports(document) {
            let symbol = binding
                .target
                .and_then(|target| table.exported_by(target, &binding.name).next())
                .or_else(|| table.lookup(&binding.name).first());
            if let Some(symbol) = symbol {
                push(local, symbol.kind(), format!("{} (imported as {local})", binding.name));
            }
        }
    }

    for symbol in table.symbols() {
        push(symbol.name(), symbol.kind(), symbol_detail(symbol));
    }

    // Definitions typed since the last relink.
    for definition in ecdsl_parser::parse_document(source).program.all_definitions() {
        let detail = definition.kind().to_string();
        push(definition.name.as_str(), definition.kind(), detail);
    }

    items.sort_by(|a, b| a.label.cmp(&b.label));
    items
}

fn symbol_detail(symbol: &Symbol) -> String {
    match symbol.version() {
        Some(version) => format!("{} {version}", symbol.kind()),
        None => symbol.kind().to_string(),
    }
}

fn version_items(name: &str, table: &SymbolTable) -> Vec<CompletionItem> {
    let mut versions: Vec<&str> = table.lookup(name).iter().filter_map(Symbol::version).collect();
    versions.sort_by(|a, b| compare_versions(Some(b), Some(a)));
    versions.dedup();

    let mut items = vec![
        CompletionItem::new("latest", CompletionKind::Version).with_detail("newest version"),
    ];
    items.extend(
        versions
            .into_iter()
            .map(|version| CompletionItem::new(version, CompletionKind::Version)),
    );
    items
}

fn import_items(path: &DocumentPath, table: &SymbolTable) -> Vec<CompletionItem> {
    let current = table.document_id(path);
    let mut seen = HashSet::new();
    let mut items: Vec<CompletionItem> = table
        .symbols()
        .filter(|symbol| Some(symbol.document) != current)
        .filter(|symbol| seen.insert(symbol.name().to_string()))
        .map(|symbol| {
            let mut item = CompletionItem::new(symbol.name(), CompletionKind::Reference(symbol.kind()));
            if let Some(path) = table.document_path(symbol.document) {
                item = item.with_detail(format!("{} from {path}", symbol.kind()));
            }
            item
        })
        .collect();
    items.sort_by(|a, b| a.label.cmp(&b.label));
    items
}

fn module_items(path: &DocumentPath, table: &SymbolTable, quoted: bool) -> Vec<CompletionItem> {
    let mut items: Vec<CompletionItem> = table
        .documents()
        .filter_map(|(_, target)| {
            if target == path || DocumentPath::is_remote_specifier(target.as_str()) {
                return None;
            }
            let specifier = relative_specifier(path, target);
            let item = CompletionItem::new(specifier.clone(), CompletionKind::Module);
            Some(if quoted {
                item
            } else {
                item.with_insert_text(format!("\"{specifier}\""))
            })
        })
        .collect();
    items.sort_by(|a, b| a.label.cmp(&b.label));
    items
}

/// Import specifier reaching `to` from a document at `from`.
fn relative_specifier(from: &DocumentPath, to: &DocumentPath) -> String {
    let base: Vec<&str> = from.parent().split('/').filter(|s| !s.is_empty()).collect();
    let target: Vec<&str> = to.as_str().split('/').filter(|s| !s.is_empty()).collect();
    let common = base
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();
    let rest = target[common..].join("/");
    match base.len() - common {
        0 => format!("./{rest}"),
        ups => format!("{}{rest}", "../".repeat(ups)),
    }
}

fn post_pass(items: Vec<CompletionItem>, prefix: &str) -> Vec<CompletionItem> {
    if prefix.is_empty() {
        return items;
    }
    let prefix = prefix.to_lowercase();
    items
        .into_iter()
        .filter(|item| item.label.to_lowercase().starts_with(&prefix))
        .collect()
}
