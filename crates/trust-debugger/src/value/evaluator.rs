//! Expression evaluation entry points and literal rendering.

use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::{EvalError, EvalResult};
use crate::target::SourceLocation;

use super::adapter::{Literal, TargetValue};
use super::context::{EvaluationContext, EvaluationOptions};
use super::object::ObjectValue;
use super::reference::{LiteralValueReference, ValueFlags, ValueRef, ValueReferenceExt};

/// Maps an identifier at a location to a fully qualified type name.
pub type TypeResolver = Arc<dyn Fn(&str, &SourceLocation) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub name: SmolStr,
    pub flags: ValueFlags,
}

/// Candidates for the identifier being typed at the end of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionData {
    pub items: Vec<CompletionItem>,
    /// Byte length of the partial identifier the items replace.
    pub expression_length: usize,
}

pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        ctx: &EvaluationContext,
        expression: &str,
        options: &EvaluationOptions,
    ) -> EvalResult<ValueRef>;

    /// Evaluate for display; failures become typed leaf nodes.
    fn evaluate_value(&self, ctx: &EvaluationContext, expression: &str) -> ObjectValue {
        match self.evaluate(ctx, expression, &ctx.options) {
            Ok(reference) => reference.object_value(),
            Err(EvalError::NotSupported(message)) => ObjectValue::not_supported(expression, message),
            Err(err @ (EvalError::Evaluation(_) | EvalError::UnresolvedName(_))) => {
                ObjectValue::error(expression, err.to_string())
            }
            Err(err) => {
                ctx.write_debugger_error(&err);
                ObjectValue::unknown(expression)
            }
        }
    }

    /// Source-level expression that reproduces `value`.
    fn to_expression(&self, ctx: &EvaluationContext, value: &TargetValue) -> EvalResult<String> {
        let literal = ctx.adapter.to_literal(ctx, value)?;
        Ok(literal_to_expression(&literal))
    }

    fn resolve(&self, expression: &str, location: &SourceLocation, types: &TypeResolver) -> String {
        resolve_type_names(expression, location, types)
    }

    /// Complete the trailing identifier of `expression`.
    ///
    /// After a `.` the candidates are the members of what precedes it;
    /// otherwise they are the names visible in the frame.
    fn completion_data(&self, ctx: &EvaluationContext, expression: &str) -> Option<CompletionData> {
        let partial_start = expression
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_identifier_char(*c))
            .last()
            .map_or(expression.len(), |(index, _)| index);
        let (prefix, partial) = expression.split_at(partial_start);
        let candidates = match prefix.trim_end().strip_suffix('.') {
            Some(target) if !target.trim().is_empty() => self
                .evaluate(ctx, target, &ctx.options)
                .ok()?
                .child_references(),
            Some(_) => return None,
            None => visible_names(ctx).ok()?,
        };
        let mut items: Vec<CompletionItem> = Vec::new();
        for candidate in candidates {
            let name = candidate.name();
            if name.starts_with(partial) && !items.iter().any(|item| item.name == name) {
                items.push(CompletionItem {
                    flags: candidate.flags(),
                    name,
                });
            }
        }
        (!items.is_empty()).then_some(CompletionData {
            items,
            expression_length: partial.len(),
        })
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Locals, parameters, the receiver and its members, in lookup order.
fn visible_names(ctx: &EvaluationContext) -> EvalResult<Vec<ValueRef>> {
    let adapter = &ctx.adapter;
    let mut names = adapter.local_variables(ctx)?;
    names.extend(adapter.parameters(ctx)?);
    if let Some(this) = adapter.this_reference(ctx)? {
        let members = this.child_references();
        names.push(this);
        names.extend(members);
    }
    Ok(names)
}

/// Default evaluator: identifiers, member chains, array indices and literals.
///
/// Names resolve against locals, then parameters, then the receiver itself,
/// then the receiver's members.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameResolvingEvaluator;

impl ExpressionEvaluator for NameResolvingEvaluator {
    fn evaluate(
        &self,
        ctx: &EvaluationContext,
        expression: &str,
        _options: &EvaluationOptions,
    ) -> EvalResult<ValueRef> {
        let expression = expression.trim();
        if let Some(literal) = parse_literal(expression) {
            let value = ctx.adapter.create_literal(ctx, &literal)?;
            let reference: ValueRef =
                Arc::new(LiteralValueReference::new(ctx.clone(), expression, value));
            return Ok(reference);
        }
        let steps = parse_access_path(expression).ok_or_else(EvalError::not_supported)?;
        let Some((root, rest)) = steps.split_first() else {
            return Err(EvalError::not_supported());
        };
        let mut current = resolve_identifier(ctx, root)?;
        for step in rest {
            current = current
                .child(step)?
                .ok_or_else(|| EvalError::UnresolvedName(SmolStr::new(expression)))?;
        }
        Ok(current)
    }
}

/// Resolve a bare identifier; first match wins.
pub fn resolve_identifier(ctx: &EvaluationContext, name: &str) -> EvalResult<ValueRef> {
    let adapter = &ctx.adapter;
    if let Some(local) = adapter
        .local_variables(ctx)?
        .into_iter()
        .find(|var| var.name() == name)
    {
        return Ok(local);
    }
    if let Some(param) = adapter
        .parameters(ctx)?
        .into_iter()
        .find(|var| var.name() == name)
    {
        return Ok(param);
    }
    if let Some(this) = adapter.this_reference(ctx)? {
        if this.name() == name {
            return Ok(this);
        }
        if let Some(member) = this
            .child_references()
            .into_iter()
            .find(|member| member.name() == name)
        {
            return Ok(member);
        }
    }
    Err(EvalError::UnresolvedName(SmolStr::new(name)))
}

/// `a.b[1].c` to `["a", "b", "[1]", "c"]`; `None` for anything else.
fn parse_access_path(expression: &str) -> Option<Vec<String>> {
    let mut steps = Vec::new();
    let mut chars = expression.chars().peekable();
    let mut expect_name = true;
    while let Some(&ch) = chars.peek() {
        if expect_name {
            let mut ident = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
                return None;
            }
            steps.push(ident);
            expect_name = false;
            continue;
        }
        match ch {
            '.' => {
                chars.next();
                expect_name = true;
            }
            '[' => {
                let mut index = String::new();
                for c in chars.by_ref() {
                    index.push(c);
                    if c == ']' {
                        break;
                    }
                }
                if !index.ends_with(']') {
                    return None;
                }
                steps.push(index.chars().filter(|c| !c.is_whitespace()).collect());
            }
            _ => return None,
        }
    }
    if expect_name {
        return None;
    }
    Some(steps)
}

/// Recognize `null`, booleans, numbers, `'c'` and `"text"`.
fn parse_literal(expression: &str) -> Option<Literal> {
    match expression {
        "null" => return Some(Literal::Null),
        "true" => return Some(Literal::Bool(true)),
        "false" => return Some(Literal::Bool(false)),
        _ => {}
    }
    if let Some(body) = expression
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return unescape(body).map(Literal::String);
    }
    if let Some(body) = expression
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        let text = unescape(body)?;
        let mut chars = text.chars();
        let ch = chars.next()?;
        return chars.next().is_none().then_some(Literal::Char(ch));
    }
    if let Some(hex) = expression.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16).ok().map(Literal::Pointer);
    }
    if let Ok(value) = expression.parse::<i64>() {
        return Some(Literal::Int(value));
    }
    if let Ok(value) = expression.parse::<u64>() {
        return Some(Literal::UInt(value));
    }
    if expression.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
        return expression.parse::<f64>().ok().map(Literal::Float);
    }
    None
}

fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        out.push(match chars.next()? {
            '\\' => '\\',
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            '\'' => '\'',
            '"' => '"',
            _ => return None,
        });
    }
    Some(out)
}

/// Escape control characters for a string or char literal.
#[must_use]
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{b}' => out.push_str("\\v"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

#[must_use]
pub fn literal_to_expression(literal: &Literal) -> String {
    match literal {
        Literal::Null => "null".to_string(),
        Literal::Bool(value) => value.to_string(),
        Literal::Int(value) => value.to_string(),
        Literal::UInt(value) => value.to_string(),
        Literal::Float(value) => value.to_string(),
        Literal::Char(ch) => format!("'{}'", escape_string(ch.encode_utf8(&mut [0; 4]))),
        Literal::String(text) => format!("\"{}\"", escape_string(text)),
        Literal::Pointer(address) => format!("0x{address:x}"),
        Literal::Other(text) => text.clone(),
    }
}

/// Rewrite dotted identifiers the resolver recognizes as types.
///
/// The longest recognized prefix of each dotted token is replaced; string and
/// char literals and member accesses (`x.Foo`) are left alone.
#[must_use]
pub fn resolve_type_names(expression: &str, location: &SourceLocation, types: &TypeResolver) -> String {
    let mut out = String::with_capacity(expression.len());
    let chars: Vec<char> = expression.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' || ch == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != ch {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(chars.len());
            out.extend(&chars[start..i]);
            continue;
        }
        if ch.is_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            let token: String = chars[start..i].iter().collect();
            let after_member = out.trim_end().ends_with('.');
            if after_member {
                out.push_str(&token);
            } else {
                out.push_str(&resolve_token(&token, location, types));
            }
            continue;
        }
        out.push(ch);
        i += 1;
    }
    out
}

fn resolve_token(token: &str, location: &SourceLocation, types: &TypeResolver) -> String {
    let segments: Vec<&str> = token.split('.').collect();
    for len in (1..=segments.len()).rev() {
        let prefix = segments[..len].join(".");
        if prefix.is_empty() {
            continue;
        }
        if let Some(resolved) = types(&prefix, location) {
            let rest = &segments[len..];
            if rest.is_empty() {
                return resolved;
            }
            return format!("{resolved}.{}", rest.join("."));
        }
    }
    token.to_string()
}
