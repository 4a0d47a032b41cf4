use std::fmt;

use bon::bon;
use thiserror::Error;
use vesper_bytecode::{AssembleError, Register};
use vesper_compiler_frontend::ast::{self, SourceMap};
use vesper_compiler_frontend::expr::{Assignable, ExprTree, Generator, Validator};
use vesper_compiler_frontend::{
    Code, Constant, Context, Emitter, Options, Reporter, Severity, Symbols, Type, UnknownSource,
};
use vesper_dotfile::Dotfile;

pub use vesper_compiler_frontend as frontend;

/// The code generated for a single expression.
#[derive(Debug)]
pub struct Compilation {
    code: Code,
    results: Box<[Register]>,
    diagnostics: Diagnostics,
}

#[bon]
impl Compilation {
    /// Lowers the expression, validates it against the required result types and generates its
    /// code. Each result value ends up in one of [`Compilation::results`].
    #[builder(finish_fn = compile)]
    pub fn new(
        #[builder(start_fn)] expr: &ast::SourceExpr<'_>,
        symbols: &Symbols,
        #[builder(default)] required: Vec<Type>,
        #[builder(default)] context: Context,
        #[builder(default)] options: Options,
    ) -> Result<Self, CompileError> {
        let mut ctx = context;
        let mut reporter = Reporter::new(options.warnings_as_errors);
        let mut tree = ExprTree::default();
        let root = tree.lower(expr);

        let validated =
            Validator::new(&mut tree, &mut ctx, symbols, &mut reporter, &options)
                .validate_multi(root, &required);
        let root = match validated {
            Some(root) if !reporter.has_serious_errors() => root,
            _ => {
                return Err(CompileError::Diagnostics(Diagnostics::new(
                    reporter.into_reported(),
                    options.warnings_as_errors,
                )));
            }
        };
        log::debug!("validated expression {root} ({} nodes)", tree.len());

        let mut code = Emitter::new(ctx.register_count());
        let results = required
            .iter()
            .map(|typ| {
                let reg = code.new_register();
                let typ = code.constant(Constant::Type(typ.clone()));
                code.emit(vesper_bytecode::Op::Var { reg, typ });
                reg
            })
            .collect::<Box<[_]>>();

        let ground = options.allow_short_circuit.then(|| code.new_label());
        let mut generator = Generator::new(&tree, &ctx, symbols, &mut code, &mut reporter);
        if let Some(ground) = ground {
            generator = generator.with_ground(ground);
        }
        if results.is_empty() {
            generator.generate_void(root);
        } else {
            let sinks = results
                .iter()
                .map(|&reg| Assignable::LocalVar(reg))
                .collect::<Vec<_>>();
            generator.generate_assignments(root, &sinks);
        }
        if let Some(ground) = ground {
            code.mark_label(ground);
        }

        Ok(Self {
            code: code.finish()?,
            results,
            diagnostics: Diagnostics::new(reporter.into_reported(), options.warnings_as_errors),
        })
    }

    #[inline]
    pub fn code(&self) -> &Code {
        &self.code
    }

    /// Registers receiving the values of the expression, one per required type.
    #[inline]
    pub fn results(&self) -> &[Register] {
        &self.results
    }

    #[inline]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

#[derive(Debug)]
pub struct Diagnostics {
    reported: Vec<frontend::Error>,
    warnings_as_errors: bool,
}

impl Diagnostics {
    fn new(reported: Vec<frontend::Error>, warnings_as_errors: bool) -> Self {
        Self {
            reported,
            warnings_as_errors,
        }
    }

    fn is_error(&self, diagnostic: &frontend::Error) -> bool {
        diagnostic.severity() >= Severity::Error || self.warnings_as_errors
    }

    pub fn has_errors(&self) -> bool {
        self.reported.iter().any(|d| self.is_error(d))
    }

    pub fn codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.reported.iter().map(frontend::Error::code)
    }

    pub fn dump(&self, sources: &SourceMap) -> Result<(), UnknownSource> {
        let mut warnings = 0;
        let mut errors = 0;

        for diagnostic in self {
            if self.is_error(diagnostic) {
                log::error!("{}", diagnostic.display(sources)?);
                errors += 1;
            } else {
                log::warn!("{}", diagnostic.display(sources)?);
                warnings += 1;
            }
        }
        log::info!("Completed with {warnings} warnings and {errors} errors");
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type IntoIter = std::slice::Iter<'a, frontend::Error>;
    type Item = &'a frontend::Error;

    fn into_iter(self) -> Self::IntoIter {
        self.reported.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.into_iter()
            .try_for_each(|d| writeln!(f, "[{}] {d}", d.code()))
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compilation failed:\n{0}")]
    Diagnostics(Diagnostics),
    #[error("code generation error: {0}")]
    Assemble(#[from] AssembleError),
}

pub trait DotfileExt {
    fn compiler_options(&self) -> Options;
}

impl DotfileExt for Dotfile {
    fn compiler_options(&self) -> Options {
        let config = &self.compiler;
        Options {
            receiver_rewrite: config.receiver_rewrite,
            exhaustive_fit_testing: config.exhaustive_fit_testing,
            warnings_as_errors: config.warnings_as_errors,
            allow_short_circuit: config.allow_short_circuit,
        }
    }
}

#[cfg(test)]
mod tests {
    use vesper_compiler_frontend::ast::build::*;
    use vesper_compiler_frontend::Param;

    use super::*;

    fn symbols() -> Symbols {
        let mut symbols = Symbols::with_default_types();
        let math = symbols.class("Math").is_static(true).define();
        symbols
            .method(math, "twice")
            .kind(frontend::MethodKind::Function)
            .params(vec![Param::new("value", Type::int())])
            .returns(vec![Type::int()])
            .define();
        symbols
    }

    #[test]
    fn compile_static_call_into_result() {
        let symbols = symbols();
        let expr = call(member(ident("Math"), "twice"), [arg(int(2))]);
        let compiled = Compilation::builder(&expr)
            .symbols(&symbols)
            .required(vec![Type::int()])
            .compile()
            .unwrap();

        assert_eq!(compiled.results().len(), 1);
        assert!(!compiled.diagnostics().has_errors());
        assert!(compiled.code().ops().iter().any(|op| op.to_string().starts_with("call_11")));
    }

    #[test]
    fn compile_reports_missing_name() {
        let symbols = symbols();
        let expr = call(member(ident("Math"), "thrice"), [arg(int(2))]);
        let err = Compilation::builder(&expr)
            .symbols(&symbols)
            .required(vec![Type::int()])
            .compile()
            .unwrap_err();

        let diagnostics = match err {
            CompileError::Diagnostics(diagnostics) => diagnostics,
            other => panic!("expected diagnostics, got {other}"),
        };
        assert!(diagnostics.has_errors());
        assert!(diagnostics.codes().any(|code| code == "MISSING_METHOD"), "{diagnostics}");
    }

    #[test]
    fn dotfile_options_follow_compiler_section() {
        let dotfile = Dotfile::parse("[compiler]\nreceiver_rewrite = false").unwrap();
        let options = dotfile.compiler_options();
        assert!(!options.receiver_rewrite);
        assert!(options.exhaustive_fit_testing);
        assert_eq!(Options::default(), Dotfile::default().compiler_options());
    }

    #[test]
    fn warnings_as_errors_escalate() {
        let diagnostics = Diagnostics::new(
            vec![frontend::Error::PropSelfAssigned("size".into(), span())],
            true,
        );
        assert!(diagnostics.has_errors());
    }
}
