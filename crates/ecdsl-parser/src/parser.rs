//! Parser for `.ec` documents.
//!
//! The parser runs over the lexer's token stream with trivia removed. Leaf
//! productions (names, references, annotations, imports) are plain winnow
//! parsers over a [`TokenSlice`]. Blocks are driven by [`DocumentParser`],
//! which owns the diagnostics, assigns definition ids and recovers at
//! statement and definition boundaries.
//!
//! Line structure still matters for recovery and for a few ambiguous
//! spots (a string after a flow step is its label only on the same line),
//! so the parser keeps the source text to look at the gaps between tokens.

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, trace};
use winnow::{
    Parser as _,
    combinator::{alt, opt, peek, preceded, separated, terminated},
    error::{ContextError, ErrMode},
    stream::{Stream, TokenSlice},
    token::any,
};

use ecdsl_core::{kind::DefinitionKind, version::VersionSelector};

use crate::{
    error::{Diagnostic, DiagnosticCollector, ErrorCode},
    span::{Span, Spanned},
    syntax::{
        Action, ActionOutput, Annotation, AnnotationArg, AttributeValue, ChannelBody,
        ContainerBody, DataOutput, DataProductBody, Definition, DefinitionBody, DomainBody,
        DomainSection, EntityBody, FlowBody, Import, ImportedName, LocalId, Member, MessageRef,
        Parameter, ParticipantBody, Program, Ref, ServiceBody, Step, TeamBody, Trigger, TypedRef,
        UserBody,
    },
    tokens::{PositionedToken, Token},
};

/// Context type for parser errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Context {
    /// Description of what was expected
    Label(&'static str),
    /// A specific keyword was expected
    Keyword(&'static str),
}

type Input<'src> = TokenSlice<'src, PositionedToken<'src>>;
type IResult<O> = Result<O, ErrMode<ContextError<Context>>>;

fn backtrack(context: Context) -> ErrMode<ContextError<Context>> {
    let mut e = ContextError::new();
    e.push(context);
    ErrMode::Backtrack(e)
}

/// Look at the next token without consuming it.
fn peek_token<'src>(input: &mut Input<'src>) -> Option<&'src PositionedToken<'src>> {
    let next: IResult<&'src PositionedToken<'src>> = peek(any).parse_next(input);
    next.ok()
}

fn next_is<'src>(input: &mut Input<'src>, expected: fn(&Token<'_>) -> bool) -> bool {
    peek_token(input).is_some_and(|token| expected(&token.token))
}

fn is_left_brace(token: &Token<'_>) -> bool {
    matches!(token, Token::LeftBrace)
}

/// Consume one token, whatever it is.
fn advance<'src>(input: &mut Input<'src>) -> IResult<&'src PositionedToken<'src>> {
    any.parse_next(input)
}

macro_rules! punctuation_parser {
    ($fn_name:ident, $variant:ident, $label:literal) => {
        fn $fn_name<'src>(input: &mut Input<'src>) -> IResult<Span> {
            any.verify_map(|token: &PositionedToken<'_>| {
                matches!(token.token, Token::$variant).then_some(token.span)
            })
            .context(Context::Label($label))
            .parse_next(input)
        }
    };
}

punctuation_parser!(left_brace, LeftBrace, "`{`");
punctuation_parser!(right_brace, RightBrace, "`}`");
punctuation_parser!(left_bracket, LeftBracket, "`[`");
punctuation_parser!(right_bracket, RightBracket, "`]`");
punctuation_parser!(left_paren, LeftParen, "`(`");
punctuation_parser!(right_paren, RightParen, "`)`");
punctuation_parser!(comma, Comma, "`,`");
punctuation_parser!(colon, Colon, "`:`");
punctuation_parser!(arrow, Arrow, "`->`");
punctuation_parser!(at, At, "`@`");

/// Parse one specific contextual keyword.
fn keyword<'src>(word: &'static str) -> impl FnMut(&mut Input<'src>) -> IResult<Span> {
    move |input: &mut Input<'src>| {
        any.verify_map(|token: &PositionedToken<'_>| {
            (token.token.as_identifier() == Some(word)).then_some(token.span)
        })
        .context(Context::Keyword(word))
        .parse_next(input)
    }
}

/// Parse a bare identifier
fn identifier<'src>(input: &mut Input<'src>) -> IResult<Spanned<String>> {
    any.verify_map(|token: &PositionedToken<'_>| {
        token
            .token
            .as_identifier()
            .map(|word| Spanned::new(word.to_string(), token.span))
    })
    .context(Context::Label("identifier"))
    .parse_next(input)
}

/// Parse string literal
fn string_literal<'src>(input: &mut Input<'src>) -> IResult<Spanned<String>> {
    any.verify_map(|token: &PositionedToken<'_>| match &token.token {
        Token::StringLiteral(text) => Some(Spanned::new(text.clone(), token.span)),
        _ => None,
    })
    .context(Context::Label("string literal"))
    .parse_next(input)
}

/// Parse a definition or reference name: an identifier or a string literal
fn element_name<'src>(input: &mut Input<'src>) -> IResult<Spanned<String>> {
    any.verify_map(|token: &PositionedToken<'_>| match &token.token {
        Token::Identifier(name) => Some(Spanned::new((*name).to_string(), token.span)),
        Token::StringLiteral(text) => Some(Spanned::new(text.clone(), token.span)),
        _ => None,
    })
    .context(Context::Label("name"))
    .parse_next(input)
}

/// Parse a scalar attribute value: string, identifier or version literal
fn text_value<'src>(input: &mut Input<'src>) -> IResult<Spanned<String>> {
    any.verify_map(|token: &PositionedToken<'_>| {
        let text = match &token.token {
            Token::StringLiteral(text) => text.clone(),
            Token::Identifier(word) | Token::Version(word) => (*word).to_string(),
            _ => return None,
        };
        Some(Spanned::new(text, token.span))
    })
    .context(Context::Label("value"))
    .parse_next(input)
}

/// Parse the value of a `version` statement
fn version_value<'src>(input: &mut Input<'src>) -> IResult<Spanned<String>> {
    any.verify_map(|token: &PositionedToken<'_>| match &token.token {
        Token::Version(raw) => Some(Spanned::new((*raw).to_string(), token.span)),
        Token::StringLiteral(text) => Some(Spanned::new(text.clone(), token.span)),
        _ => None,
    })
    .context(Context::Label("version"))
    .parse_next(input)
}

/// Parse `true` or `false`
fn boolean<'src>(input: &mut Input<'src>) -> IResult<Spanned<bool>> {
    any.verify_map(|token: &PositionedToken<'_>| match token.token.as_identifier() {
        Some("true") => Some(Spanned::new(true, token.span)),
        Some("false") => Some(Spanned::new(false, token.span)),
        _ => None,
    })
    .context(Context::Label("`true` or `false`"))
    .parse_next(input)
}

/// Parse `["a", "b"]`, allowing a trailing comma
fn string_list<'src>(input: &mut Input<'src>) -> IResult<Vec<String>> {
    left_bracket.parse_next(input)?;
    let items: Vec<Spanned<String>> = separated(0.., text_value, comma).parse_next(input)?;
    opt(comma).parse_next(input)?;
    right_bracket.parse_next(input)?;
    Ok(items.into_iter().map(Spanned::into_inner).collect())
}

/// Parse the selector attached to a reference: `@1.0.0`, `@^1` or `@"1.x"`
fn version_selector<'src>(input: &mut Input<'src>) -> IResult<Spanned<String>> {
    alt((
        any.verify_map(|token: &PositionedToken<'_>| match &token.token {
            Token::VersionSelector(raw) => Some(Spanned::new((*raw).to_string(), token.span)),
            _ => None,
        }),
        (at, string_literal)
            .map(|(at, text)| Spanned::new(text.inner().clone(), at.union(text.span()))),
    ))
    .context(Context::Label("version selector"))
    .parse_next(input)
}

/// Parse a reference: a name with an optional version selector
fn reference<'src>(input: &mut Input<'src>) -> IResult<Ref> {
    let name = element_name
        .context(Context::Label("reference"))
        .parse_next(input)?;
    let selector = opt(version_selector).parse_next(input)?;

    Ok(match selector {
        Some(selector) => Ref::new(
            name,
            VersionSelector::parse(selector.as_str()),
            Some(selector.span()),
        ),
        None => Ref::new(name, VersionSelector::Latest, None),
    })
}

fn definition_kind<'src>(input: &mut Input<'src>) -> IResult<Spanned<DefinitionKind>> {
    any.verify_map(|token: &PositionedToken<'_>| {
        token
            .token
            .as_identifier()
            .and_then(DefinitionKind::from_keyword)
            .map(|kind| Spanned::new(kind, token.span))
    })
    .context(Context::Label("definition kind"))
    .parse_next(input)
}

fn message_kind<'src>(input: &mut Input<'src>) -> IResult<Spanned<DefinitionKind>> {
    any.verify_map(|token: &PositionedToken<'_>| {
        token
            .token
            .as_identifier()
            .and_then(DefinitionKind::from_keyword)
            .filter(|kind| kind.is_message())
            .map(|kind| Spanned::new(kind, token.span))
    })
    .context(Context::Label("message kind (`event`, `command` or `query`)"))
    .parse_next(input)
}

/// Parse `KIND ref`, as in `owns entity Order`
fn typed_reference<'src>(input: &mut Input<'src>) -> IResult<TypedRef> {
    let kind = definition_kind.parse_next(input)?;
    let target = reference.parse_next(input)?;
    Ok(TypedRef { kind, target })
}

fn imported_name<'src>(input: &mut Input<'src>) -> IResult<ImportedName> {
    let name = element_name.parse_next(input)?;
    let alias = opt(preceded(keyword("as"), element_name)).parse_next(input)?;
    Ok(ImportedName { name, alias })
}

/// Parse `import { A, B as C } from "./other.ec"`
fn import<'src>(input: &mut Input<'src>) -> IResult<Import> {
    let start = keyword("import").parse_next(input)?;
    left_brace.parse_next(input)?;
    let names: Vec<ImportedName> = separated(1.., imported_name, comma).parse_next(input)?;
    opt(comma).parse_next(input)?;
    right_brace.parse_next(input)?;
    keyword("from").parse_next(input)?;
    let source = string_literal
        .context(Context::Label("import path"))
        .parse_next(input)?;

    let span = start.union(source.span());
    Ok(Import {
        names,
        source,
        span,
    })
}

/// Parse one annotation argument: `"Beta"` or `color: "blue"`
fn annotation_arg<'src>(input: &mut Input<'src>) -> IResult<AnnotationArg> {
    let key = opt(terminated(identifier, colon)).parse_next(input)?;
    let value = text_value.parse_next(input)?;
    Ok(AnnotationArg {
        key: key.map(Spanned::into_inner),
        value: value.into_inner(),
    })
}

/// Parse `@name` or `@name(args)`
fn annotation<'src>(input: &mut Input<'src>) -> IResult<Annotation> {
    let start = at.parse_next(input)?;
    let name = identifier
        .context(Context::Label("annotation name"))
        .parse_next(input)?;
    let mut span = start.union(name.span());

    let mut args = Vec::new();
    if opt(left_paren).parse_next(input)?.is_some() {
        args = separated(0.., annotation_arg, comma).parse_next(input)?;
        opt(comma).parse_next(input)?;
        span = span.union(right_paren.parse_next(input)?);
    }

    Ok(Annotation { name, args, span })
}

/// Parse `parameter region { description "..." enum ["eu", "us"] }`
fn parameter<'src>(input: &mut Input<'src>) -> IResult<Parameter> {
    let start = keyword("parameter").parse_next(input)?;
    let name = element_name.parse_next(input)?;
    let mut span = start.union(name.span());
    let mut attributes = IndexMap::new();

    if opt(left_brace).parse_next(input)?.is_some() {
        loop {
            if let Some(close) = opt(right_brace).parse_next(input)? {
                span = span.union(close);
                break;
            }
            let field = any
                .verify_map(|token: &PositionedToken<'_>| {
                    token
                        .token
                        .as_identifier()
                        .filter(|word| {
                            matches!(*word, "description" | "default" | "enum" | "examples")
                        })
                        .map(str::to_string)
                })
                .context(Context::Label(
                    "parameter field (`description`, `default`, `enum` or `examples`)",
                ))
                .parse_next(input)?;
            let value = match field.as_str() {
                "enum" | "examples" => AttributeValue::List(string_list.parse_next(input)?),
                _ => AttributeValue::Text(text_value.parse_next(input)?.into_inner()),
            };
            attributes.insert(field, value);
        }
    }

    Ok(Parameter {
        name,
        attributes,
        span,
    })
}

/// Parse `{ contract { path "..." name "..." } }` after a data product output
fn output_contract<'src>(input: &mut Input<'src>) -> IResult<IndexMap<String, String>> {
    let mut contract = IndexMap::new();
    left_brace.parse_next(input)?;
    keyword("contract").parse_next(input)?;
    left_brace.parse_next(input)?;
    while opt(right_brace).parse_next(input)?.is_none() {
        let key = identifier
            .context(Context::Label("contract field"))
            .parse_next(input)?;
        let value = text_value.parse_next(input)?;
        contract.insert(key.into_inner(), value.into_inner());
    }
    right_brace.parse_next(input)?;
    Ok(contract)
}

/// The value shape of a scalar attribute statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeShape {
    Text,
    Flag,
    /// Repeatable; values accumulate under a pluralized key.
    List(&'static str),
}

/// Scalar attribute statements accepted inside a block of `kind`.
fn attribute_shape(kind: DefinitionKind, keyword: &str) -> Option<AttributeShape> {
    use AttributeShape::{Flag, List, Text};
    use DefinitionKind as K;

    let shape = match (kind, keyword) {
        (_, "name" | "summary" | "schema") => Text,
        (_, "owner") => List("owners"),
        (_, "deprecated" | "draft") => Flag,
        (K::Channel, "address") => Text,
        (K::Channel, "protocol") => List("protocols"),
        (K::Entity, "identifier") => Text,
        (K::Entity, "aggregate-root") => Flag,
        (
            K::Container,
            "container-type" | "technology" | "access-mode" | "classification" | "residency"
            | "retention",
        ) => Text,
        (K::Container, "authoritative") => Flag,
        (K::User, "email" | "role" | "avatar") => Text,
        (K::Team, "email" | "slack") => Text,
        _ => return None,
    };
    Some(shape)
}

fn is_top_level_keyword(token: &Token<'_>) -> bool {
    token
        .as_identifier()
        .is_some_and(|word| word == "import" || DefinitionKind::from_keyword(word).is_some())
}

/// Stateful driver for block-structured parsing with recovery.
struct DocumentParser<'src> {
    source: &'src str,
    tokens: &'src [PositionedToken<'src>],
    diagnostics: DiagnosticCollector,
    next_id: u32,
}

impl<'src> DocumentParser<'src> {
    fn new(source: &'src str, tokens: &'src [PositionedToken<'src>]) -> Self {
        Self {
            source,
            tokens,
            diagnostics: DiagnosticCollector::new(),
            next_id: 0,
        }
    }

    fn allocate_id(&mut self) -> LocalId {
        let id = LocalId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Index of the next token in `tokens`.
    fn position(&self, input: &Input<'src>) -> usize {
        self.tokens.len() - input.eof_offset()
    }

    /// Returns `true` if a line break separates token `index` from the one before it.
    fn starts_line(&self, index: usize) -> bool {
        let previous = index.checked_sub(1).and_then(|i| self.tokens.get(i));
        match (previous, self.tokens.get(index)) {
            (Some(previous), Some(current)) => self
                .source
                .get(previous.span.end()..current.span.start())
                .is_some_and(|gap| gap.contains('\n')),
            _ => true,
        }
    }

    fn at_line_start(&self, input: &Input<'src>) -> bool {
        self.starts_line(self.position(input))
    }

    /// A string literal right after a step on the same line labels that step.
    fn same_line_label(&self, input: &mut Input<'src>) -> IResult<Option<Spanned<String>>> {
        if self.at_line_start(input) {
            return Ok(None);
        }
        opt(string_literal).parse_next(input)
    }

    fn program(&mut self, input: &mut Input<'src>) -> Program {
        let mut program = Program::default();

        while let Some(token) = peek_token(input) {
            let checkpoint = input.checkpoint();
            let result = if token.token.as_identifier() == Some("import") {
                import
                    .parse_next(input)
                    .map(|parsed| program.imports.push(parsed))
            } else if is_top_level_keyword(&token.token) {
                self.definition(input)
                    .map(|definition| program.definitions.push(Arc::new(definition)))
            } else {
                Err(backtrack(Context::Label("definition or `import`")))
            };

            if let Err(error) = result {
                let diagnostic = self.convert_error(error, input);
                self.diagnostics.emit(diagnostic);
                input.reset(&checkpoint);
                self.skip_to_definition(input);
            }
        }

        program
    }

    /// Skip to the next top-level keyword at the start of a line outside any block.
    ///
    /// Always consumes at least one token.
    fn skip_to_definition(&self, input: &mut Input<'src>) {
        let mut depth = 0usize;
        let mut first = true;
        while let Some(token) = peek_token(input) {
            if !first && depth == 0 && self.at_line_start(input) && is_top_level_keyword(&token.token)
            {
                break;
            }
            first = false;
            match token.token {
                Token::LeftBrace => depth += 1,
                Token::RightBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            input.next_token();
        }
    }

    /// Skip the rest of a malformed statement: up to the next line at the same
    /// nesting level or the closing brace of the enclosing block.
    ///
    /// Always consumes at least one token.
    fn skip_statement(&self, input: &mut Input<'src>) {
        let mut depth = 0usize;
        let mut first = true;
        while let Some(token) = peek_token(input) {
            if !first
                && depth == 0
                && (matches!(token.token, Token::RightBrace) || self.at_line_start(input))
            {
                break;
            }
            first = false;
            match token.token {
                Token::LeftBrace | Token::LeftBracket | Token::LeftParen => depth += 1,
                Token::RightBrace | Token::RightBracket | Token::RightParen => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            input.next_token();
        }
    }

    fn definition(&mut self, input: &mut Input<'src>) -> IResult<Definition> {
        let kind = definition_kind.parse_next(input)?;
        let name = element_name
            .context(Context::Label("definition name"))
            .parse_next(input)?;
        let mut definition = self.new_definition(*kind.inner(), kind.span(), name, None);

        if next_is(input, is_left_brace) {
            let open = left_brace.parse_next(input)?;
            let end = self.block(input, &mut definition, open);
            definition.span = definition.span.union(end);
        }

        trace!(kind:% = definition.kind(), name = definition.name.as_str(); "Parsed definition");
        Ok(definition)
    }

    fn new_definition(
        &mut self,
        kind: DefinitionKind,
        keyword_span: Span,
        name: Spanned<String>,
        version: Option<Spanned<String>>,
    ) -> Definition {
        let span = keyword_span.union(name.span());
        Definition {
            id: self.allocate_id(),
            keyword_span,
            name,
            version,
            attributes: IndexMap::new(),
            annotations: Vec::new(),
            body: DefinitionBody::empty(kind),
            span,
        }
    }

    /// Parse a definition written in place of a reference, such as a service
    /// nested in a domain or a message declared where it is sent.
    fn inline_definition(
        &mut self,
        input: &mut Input<'src>,
        kind: DefinitionKind,
        keyword_span: Span,
        reference: &Ref,
    ) -> IResult<Arc<Definition>> {
        let open = left_brace.parse_next(input)?;
        let version = match (&reference.version, reference.version_span) {
            (VersionSelector::Exact(raw), Some(span)) => Some(Spanned::new(raw.clone(), span)),
            _ => None,
        };
        let mut definition =
            self.new_definition(kind, keyword_span, reference.name.clone(), version);
        let end = self.block(input, &mut definition, open);
        definition.span = definition.span.union(end);
        Ok(Arc::new(definition))
    }

    /// Parse statements up to the closing brace.
    ///
    /// Returns the span of the closing brace, or of the last token when the
    /// document ends first.
    fn block(&mut self, input: &mut Input<'src>, definition: &mut Definition, open: Span) -> Span {
        loop {
            let Some(token) = peek_token(input) else {
                self.diagnostics.emit(
                    Diagnostic::error(format!(
                        "unclosed block for {} `{}`",
                        definition.kind(),
                        definition.name
                    ))
                    .with_code(ErrorCode::E101)
                    .with_label(open, "block opened here")
                    .with_help("add a closing `}`"),
                );
                return self.tokens.last().map_or(open, |last| last.span);
            };

            if matches!(token.token, Token::RightBrace) {
                input.next_token();
                return token.span;
            }

            let checkpoint = input.checkpoint();
            if let Err(error) = self.statement(input, definition) {
                let diagnostic = self.convert_error(error, input);
                self.diagnostics.emit(diagnostic);
                input.reset(&checkpoint);
                self.skip_statement(input);
            }
        }
    }

    fn statement(&mut self, input: &mut Input<'src>, definition: &mut Definition) -> IResult<()> {
        let Some(token) = peek_token(input) else {
            return Err(backtrack(Context::Label("statement")));
        };
        let kind = definition.kind();

        match &token.token {
            Token::At => {
                definition.annotations.push(annotation.parse_next(input)?);
                return Ok(());
            }
            Token::Identifier(_) => {}
            Token::StringLiteral(_) if kind == DefinitionKind::Flow => {}
            _ => return Err(backtrack(Context::Label("statement"))),
        }
        let word = token.token.as_identifier().unwrap_or_default();

        if word == "version" {
            advance(input)?;
            definition.version = Some(version_value.parse_next(input)?);
            return Ok(());
        }
        if let Some(shape) = attribute_shape(kind, word) {
            return self.attribute(input, definition, word, shape);
        }

        let handled = match &mut definition.body {
            DefinitionBody::Domain(domain) => self.domain_statement(input, domain, word)?,
            DefinitionBody::Service(service) => self.service_statement(input, service, word)?,
            DefinitionBody::Channel(channel) => channel_statement(input, channel, word)?,
            DefinitionBody::Entity(entity) => entity_statement(input, entity, word)?,
            DefinitionBody::Container(container) => container_statement(input, container, word)?,
            DefinitionBody::Flow(flow) => self.flow_statement(input, flow, word)?,
            DefinitionBody::Actor(participant) | DefinitionBody::ExternalSystem(participant) => {
                participant_statement(input, participant, word)?
            }
            DefinitionBody::User(user) => user_statement(input, user, word)?,
            DefinitionBody::Team(team) => team_statement(input, team, word)?,
            DefinitionBody::DataProduct(product) => data_product_statement(input, product, word)?,
            DefinitionBody::Event(_)
            | DefinitionBody::Command(_)
            | DefinitionBody::Query(_)
            | DefinitionBody::Diagram(_) => false,
        };

        if !handled {
            self.diagnostics.emit(
                Diagnostic::error(format!("unknown statement `{word}` in {kind} block"))
                    .with_code(ErrorCode::E102)
                    .with_label(token.span, ErrorCode::E102.description())
                    .with_help(format!("`{word}` is not valid inside a {kind}")),
            );
            self.skip_statement(input);
        }
        Ok(())
    }

    fn attribute(
        &mut self,
        input: &mut Input<'src>,
        definition: &mut Definition,
        word: &str,
        shape: AttributeShape,
    ) -> IResult<()> {
        let keyword_span = advance(input)?.span;

        match shape {
            AttributeShape::Text => {
                let value = text_value.parse_next(input)?;
                let span = keyword_span.union(value.span());
                definition.attributes.insert(
                    word.to_string(),
                    Spanned::new(AttributeValue::Text(value.into_inner()), span),
                );
            }
            AttributeShape::Flag => {
                let value = opt(boolean).parse_next(input)?;
                let span = value
                    .as_ref()
                    .map_or(keyword_span, |value| keyword_span.union(value.span()));
                let flag = value.is_none_or(|value| *value.inner());
                definition.attributes.insert(
                    word.to_string(),
                    Spanned::new(AttributeValue::Flag(flag), span),
                );
            }
            AttributeShape::List(key) => {
                let value = text_value.parse_next(input)?;
                let mut span = keyword_span.union(value.span());
                let mut items = Vec::new();
                if let Some(existing) = definition.attributes.get(key) {
                    if let AttributeValue::List(previous) = existing.inner() {
                        items.clone_from(previous);
                        span = existing.span().union(span);
                    }
                }
                items.push(value.into_inner());
                definition
                    .attributes
                    .insert(key.to_string(), Spanned::new(AttributeValue::List(items), span));
            }
        }
        Ok(())
    }

    fn member(
        &mut self,
        input: &mut Input<'src>,
        kind: DefinitionKind,
        keyword_span: Span,
    ) -> IResult<Member> {
        let reference = reference.parse_next(input)?;
        let inline = if next_is(input, is_left_brace) {
            Some(self.inline_definition(input, kind, keyword_span, &reference)?)
        } else {
            None
        };
        Ok(Member { reference, inline })
    }

    /// Parse `sends KIND ref (to ref, ...)? ({ ... })?` or the `receives`/`from` form.
    fn message_ref(&mut self, input: &mut Input<'src>, outgoing: bool) -> IResult<MessageRef> {
        advance(input)?;
        let kind = message_kind.parse_next(input)?;
        let target = reference.parse_next(input)?;

        let via = if outgoing { "to" } else { "from" };
        let channels = if opt(keyword(via)).parse_next(input)?.is_some() {
            separated(1.., reference, comma).parse_next(input)?
        } else {
            Vec::new()
        };

        let inline = if next_is(input, is_left_brace) {
            Some(self.inline_definition(input, *kind.inner(), kind.span(), &target)?)
        } else {
            None
        };

        Ok(MessageRef {
            kind,
            target,
            channels,
            inline,
        })
    }

    fn domain_statement(
        &mut self,
        input: &mut Input<'src>,
        domain: &mut DomainBody,
        word: &str,
    ) -> IResult<bool> {
        if let Some(section) = DomainSection::from_keyword(word) {
            let keyword_span = advance(input)?.span;
            let member = self.member(input, section.kind(), keyword_span)?;
            domain.section_mut(section).push(member);
            return Ok(true);
        }

        match word {
            "sends" => domain.sends.push(self.message_ref(input, true)?),
            "receives" => domain.receives.push(self.message_ref(input, false)?),
            "owns" => domain.owns.push(preceded(advance, typed_reference).parse_next(input)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn service_statement(
        &mut self,
        input: &mut Input<'src>,
        service: &mut ServiceBody,
        word: &str,
    ) -> IResult<bool> {
        let target = match word {
            "sends" => {
                service.sends.push(self.message_ref(input, true)?);
                return Ok(true);
            }
            "receives" => {
                service.receives.push(self.message_ref(input, false)?);
                return Ok(true);
            }
            "owns" => {
                service
                    .owns
                    .push(preceded(advance, typed_reference).parse_next(input)?);
                return Ok(true);
            }
            "writes-to" => &mut service.writes_to,
            "reads-from" => &mut service.reads_from,
            "reads-writes" => &mut service.reads_writes,
            "entity" => &mut service.entities,
            _ => return Ok(false),
        };

        advance(input)?;
        if word != "entity" {
            opt(keyword("container")).parse_next(input)?;
        }
        target.push(reference.parse_next(input)?);
        Ok(true)
    }

    fn flow_statement(
        &mut self,
        input: &mut Input<'src>,
        flow: &mut FlowBody,
        word: &str,
    ) -> IResult<bool> {
        if word == "when" {
            flow.triggers.push(self.trigger(input)?);
        } else {
            flow.chains.push(self.chain(input)?);
        }
        Ok(true)
    }

    /// Parse `step (-> step)*`
    fn chain(&self, input: &mut Input<'src>) -> IResult<Vec<Step>> {
        let mut steps = vec![self.step(input)?];
        while opt(arrow).parse_next(input)?.is_some() {
            steps.push(self.step(input)?);
        }
        Ok(steps)
    }

    fn step(&self, input: &mut Input<'src>) -> IResult<Step> {
        if let Some(label) = opt(string_literal).parse_next(input)? {
            return Ok(Step::Node { label });
        }
        let target = reference
            .context(Context::Label("flow step"))
            .parse_next(input)?;
        let label = self.same_line_label(input)?;
        Ok(Step::Reference { target, label })
    }

    /// Parse `when A and B` followed by its actions, up to the next `when`
    /// or the end of the flow.
    fn trigger(&self, input: &mut Input<'src>) -> IResult<Trigger> {
        let start = keyword("when").parse_next(input)?;
        let conditions: Vec<Ref> = separated(1.., reference, keyword("and")).parse_next(input)?;
        let mut span = conditions
            .last()
            .map_or(start, |condition| start.union(condition.span()));

        let mut actions = Vec::new();
        while let Some(token) = peek_token(input) {
            let starts_action = match &token.token {
                Token::Identifier(word) => {
                    *word != "when"
                        && *word != "version"
                        && attribute_shape(DefinitionKind::Flow, word).is_none()
                }
                Token::StringLiteral(_) => true,
                _ => false,
            };
            if !starts_action {
                break;
            }
            let action = self.action(input)?;
            span = span.union(
                action
                    .outputs
                    .last()
                    .map_or(action.target.span(), |output| output.target.span()),
            );
            actions.push(action);
        }

        Ok(Trigger {
            conditions,
            actions,
            span,
        })
    }

    /// Parse `Target "label"? (-> ("label":)? Output)*`
    fn action(&self, input: &mut Input<'src>) -> IResult<Action> {
        let target = reference
            .context(Context::Label("action"))
            .parse_next(input)?;
        let label = self.same_line_label(input)?;

        let mut outputs = Vec::new();
        while opt(arrow).parse_next(input)?.is_some() {
            let label = opt(terminated(string_literal, colon)).parse_next(input)?;
            let target = reference.parse_next(input)?;
            outputs.push(ActionOutput { label, target });
        }

        Ok(Action {
            target,
            label,
            outputs,
        })
    }
}

fn channel_statement<'src>(
    input: &mut Input<'src>,
    channel: &mut ChannelBody,
    word: &str,
) -> IResult<bool> {
    match word {
        "route" => channel
            .routes
            .push(preceded(advance, reference).parse_next(input)?),
        "parameter" => channel.parameters.push(parameter.parse_next(input)?),
        _ => return Ok(false),
    }
    Ok(true)
}

fn entity_statement<'src>(
    input: &mut Input<'src>,
    entity: &mut EntityBody,
    word: &str,
) -> IResult<bool> {
    if word != "owns" {
        return Ok(false);
    }
    entity
        .owns
        .push(preceded(advance, typed_reference).parse_next(input)?);
    Ok(true)
}

fn container_statement<'src>(
    input: &mut Input<'src>,
    container: &mut ContainerBody,
    word: &str,
) -> IResult<bool> {
    let target = match word {
        "reads-from" => &mut container.reads_from,
        "writes-to" => &mut container.writes_to,
        _ => return Ok(false),
    };
    advance(input)?;
    opt(keyword("service")).parse_next(input)?;
    target.push(reference.parse_next(input)?);
    Ok(true)
}

fn participant_statement<'src>(
    input: &mut Input<'src>,
    participant: &mut ParticipantBody,
    word: &str,
) -> IResult<bool> {
    if word != "uses" {
        return Ok(false);
    }
    participant
        .uses
        .push(preceded(advance, reference).parse_next(input)?);
    Ok(true)
}

fn user_statement<'src>(input: &mut Input<'src>, user: &mut UserBody, word: &str) -> IResult<bool> {
    match word {
        "team" => user.teams.push(preceded(advance, reference).parse_next(input)?),
        "owns" => user
            .owns
            .push(preceded(advance, typed_reference).parse_next(input)?),
        _ => return Ok(false),
    }
    Ok(true)
}

fn team_statement<'src>(input: &mut Input<'src>, team: &mut TeamBody, word: &str) -> IResult<bool> {
    match word {
        "member" => team
            .members
            .push(preceded(advance, reference).parse_next(input)?),
        "owns" => team
            .owns
            .push(preceded(advance, typed_reference).parse_next(input)?),
        _ => return Ok(false),
    }
    Ok(true)
}

fn data_product_statement<'src>(
    input: &mut Input<'src>,
    product: &mut DataProductBody,
    word: &str,
) -> IResult<bool> {
    match word {
        "input" => product
            .inputs
            .push(preceded(advance, typed_reference).parse_next(input)?),
        "output" => {
            let target = preceded(advance, typed_reference).parse_next(input)?;
            let contract = if next_is(input, is_left_brace) {
                output_contract.parse_next(input)?
            } else {
                IndexMap::new()
            };
            product.outputs.push(DataOutput { target, contract });
        }
        _ => return Ok(false),
    }
    Ok(true)
}

impl DocumentParser<'_> {
    /// Convert a winnow error into a diagnostic pointing at the offending token.
    fn convert_error(
        &self,
        error: ErrMode<ContextError<Context>>,
        input: &mut Input<'_>,
    ) -> Diagnostic {
        let expected = match &error {
            ErrMode::Backtrack(e) | ErrMode::Cut(e) => e.context().last().map(|ctx| match ctx {
                Context::Label(label) => (*label).to_string(),
                Context::Keyword(word) => format!("`{word}`"),
            }),
            ErrMode::Incomplete(_) => None,
        };

        match peek_token(input) {
            Some(found) => {
                let message = match expected {
                    Some(expected) => format!("expected {expected}, found {}", found.token),
                    None => format!("unexpected {}", found.token),
                };
                Diagnostic::error(message)
                    .with_code(ErrorCode::E100)
                    .with_label(found.span, ErrorCode::E100.description())
            }
            None => {
                let end = self.tokens.last().map_or(0, |last| last.span.end());
                let message = match expected {
                    Some(expected) => format!("expected {expected}, found end of input"),
                    None => "unexpected end of input".to_string(),
                };
                Diagnostic::error(message)
                    .with_code(ErrorCode::E101)
                    .with_label(Span::new(end..end), ErrorCode::E101.description())
                    .with_help("the document ends in the middle of a statement")
            }
        }
    }
}

/// Parse a trivia-free token stream into a program, recovering from errors.
///
/// `source` must be the text the tokens were produced from.
pub fn parse_program<'src>(
    source: &'src str,
    tokens: &'src [PositionedToken<'src>],
) -> (Program, Vec<Diagnostic>) {
    let mut input = TokenSlice::new(tokens);
    let mut parser = DocumentParser::new(source, tokens);
    let program = parser.program(&mut input);
    let diagnostics = parser.diagnostics.into_diagnostics();

    debug!(
        definitions = program.definitions.len(),
        imports = program.imports.len(),
        diagnostics = diagnostics.len();
        "Parsed document"
    );
    (program, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn significant(source: &str) -> Vec<PositionedToken<'_>> {
        let (tokens, diagnostics) = tokenize(source);
        assert!(diagnostics.is_empty(), "lexer diagnostics: {diagnostics:?}");
        tokens.into_iter().filter(|t| !t.token.is_trivia()).collect()
    }

    fn parse_with<O>(source: &str, parser: impl Fn(&mut Input<'_>) -> IResult<O>) -> O {
        let tokens = significant(source);
        let mut slice = TokenSlice::new(&tokens);
        let result = parser(&mut slice);
        assert!(slice.eof_offset() == 0, "trailing tokens in {source}");
        match result {
            Ok(value) => value,
            Err(err) => panic!("failed to parse {source}: {err:?}"),
        }
    }

    #[test]
    fn test_reference_without_selector() {
        let parsed = parse_with("Orders", |i| reference.parse_next(i));
        assert_eq!(parsed.name.as_str(), "Orders");
        assert!(parsed.version.is_latest());
        assert_eq!(parsed.span(), Span::new(0..6));
    }

    #[test]
    fn test_reference_with_selector() {
        let parsed = parse_with("OrderCreated@^1.2", |i| reference.parse_next(i));
        assert_eq!(parsed.name.as_str(), "OrderCreated");
        assert_eq!(parsed.version.as_str(), Some("^1.2"));
        assert_eq!(parsed.span(), Span::new(0..17));
    }

    #[test]
    fn test_reference_with_string_selector() {
        let parsed = parse_with(r#"Orders@"1.x""#, |i| reference.parse_next(i));
        assert_eq!(parsed.version.as_str(), Some("1.x"));
    }

    #[test]
    fn test_string_name_reference() {
        let parsed = parse_with(r#""Order Service""#, |i| reference.parse_next(i));
        assert_eq!(parsed.name.as_str(), "Order Service");
    }

    #[test]
    fn test_import() {
        let parsed = parse_with(
            r#"import { Orders, Payments as Billing, } from "./shared.ec""#,
            |i| import.parse_next(i),
        );
        assert_eq!(parsed.source.as_str(), "./shared.ec");
        assert_eq!(parsed.names.len(), 2);
        assert_eq!(parsed.names[0].local_name().as_str(), "Orders");
        assert_eq!(parsed.names[1].name.as_str(), "Payments");
        assert_eq!(parsed.names[1].local_name().as_str(), "Billing");
        assert!(!parsed.is_remote());
    }

    #[test]
    fn test_annotation_with_args() {
        let parsed = parse_with(r#"@badge("Beta", color: "blue")"#, |i| {
            annotation.parse_next(i)
        });
        assert_eq!(parsed.name.as_str(), "badge");
        assert_eq!(
            parsed.args,
            vec![
                AnnotationArg {
                    key: None,
                    value: "Beta".to_string()
                },
                AnnotationArg {
                    key: Some("color".to_string()),
                    value: "blue".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_bare_annotation() {
        let parsed = parse_with("@internal", |i| annotation.parse_next(i));
        assert_eq!(parsed.name.as_str(), "internal");
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn test_message_kind_rejects_non_messages() {
        let tokens = significant("service");
        let mut slice = TokenSlice::new(&tokens);
        assert!(message_kind.parse_next(&mut slice).is_err());
    }

    #[test]
    fn test_parameter_block() {
        let parsed = parse_with(
            r#"parameter region { description "Deployment region" enum ["eu", "us"] }"#,
            |i| parameter.parse_next(i),
        );
        assert_eq!(parsed.name.as_str(), "region");
        assert_eq!(
            parsed.attributes.get("enum"),
            Some(&AttributeValue::List(vec!["eu".into(), "us".into()]))
        );
        assert_eq!(
            parsed.attributes.get("description"),
            Some(&AttributeValue::Text("Deployment region".into()))
        );
    }

    #[test]
    fn test_attribute_shapes() {
        assert_eq!(
            attribute_shape(DefinitionKind::Service, "summary"),
            Some(AttributeShape::Text)
        );
        assert_eq!(
            attribute_shape(DefinitionKind::Channel, "protocol"),
            Some(AttributeShape::List("protocols"))
        );
        assert_eq!(attribute_shape(DefinitionKind::Service, "address"), None);
        assert_eq!(
            attribute_shape(DefinitionKind::Container, "authoritative"),
            Some(AttributeShape::Flag)
        );
    }

    #[test]
    fn test_starts_line() {
        let source = "a b\nc";
        let tokens = significant(source);
        let parser = DocumentParser::new(source, &tokens);
        assert!(parser.starts_line(0));
        assert!(!parser.starts_line(1));
        assert!(parser.starts_line(2));
    }
}
