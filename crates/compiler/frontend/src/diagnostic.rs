use std::fmt;

use derive_where::derive_where;
use itertools::Itertools;
use thiserror::Error;
use vesper_ast::{SourceMap, Span};

use crate::types::Name;
use crate::utils::DisplayFn;

/// A user-facing problem found while validating or generating an expression.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("type mismatch: found `{found}` when expected `{expected}`")]
    WrongType {
        expected: Box<str>,
        found: Box<str>,
        span: Span,
    },
    #[error("expected {expected} value(s), but the expression yields {found}")]
    WrongTypeArity {
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("a short-circuiting expression is not allowed here")]
    ShortCircuitIllegal(Span),
    #[error("this expression cannot be assigned to")]
    AssignableRequired(Span),
    #[error("`{0}` could not be resolved")]
    NameMissing(Name, Span),
    #[error("`{0}` is not a known type")]
    UnknownType(Box<str>, Span),
    #[error("no method named `{0}` matches the provided arguments")]
    MissingMethod(Name, Span),
    #[error("`{0}` has no constructor matching the provided arguments")]
    MissingConstructor(Box<str>, Span),
    #[error(
        "multiple overloads of `{}` match the types of the provided arguments:\n{}",
        .0,
        .1.iter().map(|sig| format!("  {sig}")).format("\n")
    )]
    SignatureAmbiguous(Name, Box<[Box<str>]>, Span),
    #[error("could not infer the type parameter(s) {}", .0.iter().format(", "))]
    TypeParamsUnresolvable(Box<[Name]>, Span),
    #[error("type arguments are not allowed here")]
    TypeParamsUnexpected(Span),
    #[error("`this` is not available in this context")]
    NoThis(Span),
    #[error("`{0}` is a method and requires a target, but there is no `this`")]
    NoThisMethod(Name, Span),
    #[error("`{0}` requires an outer target that is not reachable from here")]
    NoOuterMethod(Name, Span),
    #[error("`{0}` is a property and requires a target, but there is no `this`")]
    NoThisProperty(Name, Span),
    #[error("`super` is not available in this context")]
    NoSuper(Span),
    #[error("`super` can only be used to invoke the overridden method")]
    InvalidSuperReference(Span),
    #[error("the keyword `{0}` is not allowed here")]
    KeywordUnexpected(Name, Span),
    #[error("positional arguments cannot follow named arguments")]
    ArgNameRequired(Span),
    #[error("the argument `{0}` is specified more than once")]
    NameCollision(Name, Span),
    #[error("a conditional result is not allowed here")]
    ConditionalReturnNotAllowed(Span),
    #[error("only an invocation that calls its target can be asynchronous")]
    AsyncNotAllowed(Span),
    #[error("this expression does not produce a value")]
    ReturnRequired(Span),
    #[error("the property `{0}` is assigned to itself")]
    PropSelfAssigned(Name, Span),
    #[error("`{0}` is read before it is definitely assigned")]
    VarUnassigned(Name, Span),
    #[error("the label `{0}` cannot be used as a value")]
    LabelAsValue(Name, Span),
    #[error("`_` is only allowed as an invocation argument")]
    UnboundNotAllowed(Span),
    #[error("`{0}` cannot be indexed with {1} index(es)")]
    NotIndexable(Box<str>, usize, Span),
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Self::WrongType { span, .. }
            | Self::WrongTypeArity { span, .. }
            | Self::ShortCircuitIllegal(span)
            | Self::AssignableRequired(span)
            | Self::NameMissing(_, span)
            | Self::UnknownType(_, span)
            | Self::MissingMethod(_, span)
            | Self::MissingConstructor(_, span)
            | Self::SignatureAmbiguous(_, _, span)
            | Self::TypeParamsUnresolvable(_, span)
            | Self::TypeParamsUnexpected(span)
            | Self::NoThis(span)
            | Self::NoThisMethod(_, span)
            | Self::NoOuterMethod(_, span)
            | Self::NoThisProperty(_, span)
            | Self::NoSuper(span)
            | Self::InvalidSuperReference(span)
            | Self::KeywordUnexpected(_, span)
            | Self::ArgNameRequired(span)
            | Self::NameCollision(_, span)
            | Self::ConditionalReturnNotAllowed(span)
            | Self::AsyncNotAllowed(span)
            | Self::ReturnRequired(span)
            | Self::PropSelfAssigned(_, span)
            | Self::VarUnassigned(_, span)
            | Self::LabelAsValue(_, span)
            | Self::UnboundNotAllowed(span)
            | Self::NotIndexable(_, _, span) => *span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongType { .. } => "WRONG_TYPE",
            Self::WrongTypeArity { .. } => "WRONG_TYPE_ARITY",
            Self::ShortCircuitIllegal(_) => "SHORT_CIRCUIT_ILLEGAL",
            Self::AssignableRequired(_) => "ASSIGNABLE_REQUIRED",
            Self::NameMissing(_, _) => "NAME_MISSING",
            Self::UnknownType(_, _) => "TYPE_UNKNOWN",
            Self::MissingMethod(_, _) => "MISSING_METHOD",
            Self::MissingConstructor(_, _) => "MISSING_CONSTRUCTOR",
            Self::SignatureAmbiguous(_, _, _) => "SIGNATURE_AMBIGUOUS",
            Self::TypeParamsUnresolvable(_, _) => "TYPE_PARAMS_UNRESOLVABLE",
            Self::TypeParamsUnexpected(_) => "TYPE_PARAMS_UNEXPECTED",
            Self::NoThis(_) => "NO_THIS",
            Self::NoThisMethod(_, _) => "NO_THIS_METHOD",
            Self::NoOuterMethod(_, _) => "NO_OUTER_METHOD",
            Self::NoThisProperty(_, _) => "NO_THIS_PROPERTY",
            Self::NoSuper(_) => "NO_SUPER",
            Self::InvalidSuperReference(_) => "INVALID_SUPER_REFERENCE",
            Self::KeywordUnexpected(_, _) => "KEYWORD_UNEXPECTED",
            Self::ArgNameRequired(_) => "ARG_NAME_REQUIRED",
            Self::NameCollision(_, _) => "NAME_COLLISION",
            Self::ConditionalReturnNotAllowed(_) => "CONDITIONAL_RETURN_NOT_ALLOWED",
            Self::AsyncNotAllowed(_) => "ASYNC_NOT_ALLOWED",
            Self::ReturnRequired(_) => "RETURN_REQUIRED",
            Self::PropSelfAssigned(_, _) => "PROP_SELF_ASSIGNED",
            Self::VarUnassigned(_, _) => "VAR_UNASSIGNED",
            Self::LabelAsValue(_, _) => "LABEL_AS_VALUE",
            Self::UnboundNotAllowed(_) => "UNBOUND_NOT_ALLOWED",
            Self::NotIndexable(_, _, _) => "NOT_INDEXABLE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::PropSelfAssigned(_, _) => Severity::Warning,
            Self::TypeParamsUnresolvable(_, _) => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    pub fn display<'a>(
        &'a self,
        sources: &'a SourceMap,
    ) -> Result<impl fmt::Display + use<'a>, UnknownSource> {
        let span = self.span();
        let file = sources.get(span.file).ok_or(UnknownSource(span))?;
        let start = file.lookup(span.start);
        let end = file.lookup(span.end);
        let line = file.line(start.line).ok_or(UnknownSource(span))?;

        Ok(DisplayFn::new(move |f: &mut fmt::Formatter<'_>| {
            writeln!(f, "At {}:{start}", file.path().display())?;
            writeln!(f, "{}", line.trim_end())?;

            let pad = start.col;
            let underline_len = if start.line == end.line {
                end.col.saturating_sub(start.col).max(1)
            } else {
                3
            };
            writeln!(f, "{:>pad$}{:^>underline_len$}", "", "")?;
            writeln!(f, "[{}] {self}", self.code())
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// Collects diagnostics. Speculative work reports into a [`Reporter::branch`] that is later
/// either merged back or dropped.
#[derive(Debug)]
#[derive_where(Default)]
pub struct Reporter<A = Error> {
    reported: Vec<A>,
    warnings_as_errors: bool,
}

impl<A> Reporter<A> {
    pub fn new(warnings_as_errors: bool) -> Self {
        Self {
            reported: Vec::new(),
            warnings_as_errors,
        }
    }

    #[inline]
    pub fn report(&mut self, error: impl Into<A>) {
        self.reported.push(error.into());
    }

    /// Opens an empty child sink with the same settings.
    #[inline]
    pub fn branch(&self) -> Self {
        Self::new(self.warnings_as_errors)
    }

    pub fn merge(&mut self, branch: Self) {
        self.reported.extend(branch.reported);
    }

    #[inline]
    pub fn reported(&self) -> &[A] {
        &self.reported
    }

    #[inline]
    pub fn into_reported(self) -> Vec<A> {
        self.reported
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }
}

impl Reporter<Error> {
    pub fn has_serious_errors(&self) -> bool {
        self.reported.iter().any(|err| {
            err.severity() >= Severity::Error
                || (self.warnings_as_errors && err.severity() == Severity::Warning)
        })
    }

    pub fn codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.reported.iter().map(Error::code)
    }
}

#[derive(Debug, Error)]
#[error("the source of a diagnostic could not be determined (span: {0})")]
pub struct UnknownSource(Span);

#[cfg(test)]
mod tests {
    use vesper_ast::SourceMap;

    use super::*;

    #[test]
    fn renders_source_line_with_underline() {
        let mut sources = SourceMap::new();
        let file = sources.push("test.vsp", "let x = foo(a, b);\n");
        let err = Error::MissingMethod("foo".into(), Span::new(8, 11, file));

        let rendered = err.display(&sources).unwrap().to_string();
        assert_eq!(
            rendered,
            "At test.vsp:1:9\nlet x = foo(a, b);\n        ^^^\n[MISSING_METHOD] no method named `foo` matches the provided arguments\n"
        );
    }

    #[test]
    fn ambiguity_lists_every_overload() {
        let span = Span::new(0, 1, SourceMap::new().push("a", ""));
        let err = Error::SignatureAmbiguous(
            "f".into(),
            ["f(Int)".into(), "f(Float)".into()].into(),
            span,
        );
        assert_eq!(
            err.to_string(),
            "multiple overloads of `f` match the types of the provided arguments:\n  f(Int)\n  f(Float)"
        );
    }

    #[test]
    fn branches_merge_or_drop() {
        let span = Span::new(0, 1, SourceMap::new().push("a", ""));
        let mut reporter: Reporter = Reporter::default();
        let mut branch = reporter.branch();
        branch.report(Error::NoThis(span));
        drop(branch);
        assert!(!reporter.has_serious_errors());

        let mut branch = reporter.branch();
        branch.report(Error::PropSelfAssigned("x".into(), span));
        reporter.merge(branch);
        assert!(!reporter.has_serious_errors());
        assert_eq!(reporter.codes().collect::<Vec<_>>(), ["PROP_SELF_ASSIGNED"]);

        let mut strict = Reporter::new(true);
        strict.report(Error::PropSelfAssigned("x".into(), span));
        assert!(strict.has_serious_errors());
    }
}
