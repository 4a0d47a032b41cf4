use bon::bon;
use enum_as_inner::EnumAsInner;
use vesper_ast::{self as ast, Span};
use vesper_bytecode::Register;

use crate::diagnostic::{Error, Reporter};
use crate::symbols::{Global, Symbols, TypeParam};
use crate::types::{ClassId, MethodId, Name, Type};
use crate::{IndexMap, IndexSet};

/// The lexical environment of the expression being compiled: local variables and labels in
/// nested scopes, the enclosing class and method, and what the body captures.
#[derive(Debug, Clone)]
pub struct Context {
    scopes: Vec<Scope>,
    this_class: Option<ClassId>,
    is_static: bool,
    method: Option<MethodId>,
    type_params: Box<[TypeParam]>,
    captures: IndexSet<Name>,
    uses_this: bool,
    next_register: u32,
}

#[bon]
impl Context {
    #[builder]
    pub fn new(
        this_class: Option<ClassId>,
        #[builder(default)] is_static: bool,
        method: Option<MethodId>,
        #[builder(default)] type_params: Vec<TypeParam>,
    ) -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Block)],
            this_class,
            is_static,
            method,
            type_params: type_params.into(),
            captures: IndexSet::default(),
            uses_this: false,
            next_register: 0,
        }
    }

    #[inline]
    pub fn this_class(&self) -> Option<ClassId> {
        self.this_class
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether `this` is reachable from the current code.
    #[inline]
    pub fn has_this(&self) -> bool {
        self.this_class.is_some() && !self.is_static
    }

    #[inline]
    pub fn method(&self) -> Option<MethodId> {
        self.method
    }

    #[inline]
    pub fn uses_this(&self) -> bool {
        self.uses_this
    }

    #[inline]
    pub fn captures(&self) -> &IndexSet<Name> {
        &self.captures
    }

    #[inline]
    pub fn register_count(&self) -> u32 {
        self.next_register
    }

    pub fn this_type(&self, symbols: &Symbols) -> Option<Type> {
        self.this_class.map(|class| symbols.this_type(class))
    }

    /// Finds the class reached by following `steps` lexical parents out of `this`. Static inner
    /// classes have no outer instance to follow.
    pub fn outer_class(&self, symbols: &Symbols, steps: u16) -> Option<ClassId> {
        let mut class = self.this_class?;
        for _ in 0..steps {
            let def = &symbols[class];
            if def.is_static() {
                return None;
            }
            class = def.parent()?;
        }
        Some(class)
    }

    pub fn require_this(&mut self, span: Span, reporter: &mut Reporter) -> bool {
        if self.has_this() {
            self.uses_this = true;
            true
        } else {
            reporter.report(Error::NoThis(span));
            false
        }
    }

    pub fn method_type_param(&self, name: &str) -> Option<&TypeParam> {
        self.type_params.iter().find(|p| &**p.name() == name)
    }

    fn allocate_register(&mut self) -> Register {
        let reg = Register::new(self.next_register);
        self.next_register += 1;
        reg
    }

    /// Declares a local variable in the innermost scope. A variable declared without a value
    /// must be assigned before it is read.
    pub fn declare_var(&mut self, name: &str, typ: Type, assigned: bool) -> Register {
        let reg = self.allocate_register();
        let var = Var {
            name: name.into(),
            reg,
            typ,
            assigned,
            effectively_final: true,
            future: false,
        };
        self.innermost().entries.insert(var.name.clone(), Local::Var(var));
        reg
    }

    /// Declares a variable whose value is produced asynchronously and never changes once
    /// available.
    pub fn declare_future(&mut self, name: &str, typ: Type) -> Register {
        let reg = self.declare_var(name, typ, true);
        self.update_var(reg, |var| var.future = true);
        reg
    }

    /// Declares a label exposing the given variables, such as the iteration state of a loop.
    pub fn declare_label<'a>(
        &mut self,
        name: &str,
        vars: impl IntoIterator<Item = (&'a str, Type)>,
    ) {
        let vars = vars
            .into_iter()
            .map(|(var, typ)| {
                let var = Var {
                    name: var.into(),
                    reg: self.allocate_register(),
                    typ,
                    assigned: true,
                    effectively_final: false,
                    future: false,
                };
                (var.name.clone(), var)
            })
            .collect();
        let label = LabelInfo {
            name: name.into(),
            vars,
        };
        self.innermost()
            .entries
            .insert(label.name.clone(), Local::Label(label));
    }

    /// Looks a name up through the scope chain. A variable found beyond a lambda boundary is
    /// recorded as a capture.
    pub fn lookup(&mut self, name: &str) -> Option<Local> {
        let mut crossed_lambda = false;
        for scope in self.scopes.iter().rev() {
            if let Some(local) = scope.entries.get(name) {
                if crossed_lambda {
                    self.captures.insert(name.into());
                }
                return Some(local.clone());
            }
            crossed_lambda |= scope.kind == ScopeKind::Lambda;
        }
        None
    }

    fn find_var(&self, reg: Register) -> Option<&Var> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.entries.values())
            .find_map(|local| local.as_var().filter(|var| var.reg == reg))
    }

    fn update_var(&mut self, reg: Register, mut f: impl FnMut(&mut Var)) {
        for local in self.scopes.iter_mut().flat_map(|s| s.entries.values_mut()) {
            match local {
                Local::Var(var) if var.reg == reg => f(var),
                _ => {}
            }
        }
    }

    pub fn is_effectively_final(&self, reg: Register) -> bool {
        self.find_var(reg).is_some_and(|var| var.effectively_final)
    }

    pub fn is_future(&self, reg: Register) -> bool {
        self.find_var(reg).is_some_and(|var| var.future)
    }

    /// Checks that a variable is definitely assigned before it is read.
    pub fn mark_var_read(&self, var: &Var, span: Span, reporter: &mut Reporter) -> bool {
        let assigned = self.find_var(var.reg).is_some_and(|var| var.assigned);
        if !assigned {
            reporter.report(Error::VarUnassigned(var.name.clone(), span));
        }
        assigned
    }

    /// Records a write. The first assignment of a variable declared without a value keeps it
    /// effectively final, any later write does not.
    pub fn mark_var_write(&mut self, reg: Register) {
        self.update_var(reg, |var| {
            if var.assigned {
                var.effectively_final = false;
            }
            var.assigned = true;
        });
    }

    /// Narrows the type of a variable for the remainder of the innermost scope.
    pub fn narrow(&mut self, name: &str, typ: Type) {
        let Some(Local::Var(var)) = self.lookup(name) else {
            return;
        };
        let var = Var { typ, ..var };
        self.innermost().entries.insert(var.name.clone(), Local::Var(var));
    }

    /// The type that an inference scope asks the current expression to produce.
    pub fn inference_hint(&self) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|scope| match &scope.kind {
            ScopeKind::Inference(hint) => Some(hint),
            _ => None,
        })
    }

    /// Runs `f` in a new nested scope that is exited when `f` returns.
    pub fn with_scope<A>(&mut self, kind: ScopeKind, f: impl FnOnce(&mut Self) -> A) -> A {
        self.scopes.push(Scope::new(kind));
        let res = f(self);
        self.scopes.pop();
        res
    }

    /// Runs `f` against a scratch copy of the context, discarding every change it makes.
    pub fn speculate<A>(&self, f: impl FnOnce(&mut Self) -> A) -> A {
        let mut scratch = self.clone();
        f(&mut scratch)
    }

    fn innermost(&mut self) -> &mut Scope {
        if self.scopes.is_empty() {
            self.scopes.push(Scope::new(ScopeKind::Block));
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    pub fn resolve_type(
        &self,
        symbols: &Symbols,
        (typ, span): &ast::SourceTypeName<'_>,
        reporter: &mut Reporter,
    ) -> Option<Type> {
        match typ {
            ast::TypeName::Named { name, args } => {
                if self.method_type_param(name).is_some()
                    || self
                        .this_class
                        .is_some_and(|class| symbols[class].formal(name).is_some())
                {
                    return Some(Type::Formal((*name).into()));
                }
                let class = self
                    .this_class
                    .and_then(|class| symbols[class].child(name))
                    .or_else(|| match symbols.global(name)? {
                        Global::Class(id) => Some(id),
                        Global::Typedef(_) => None,
                    });
                match (class, symbols.global(name)) {
                    (Some(class), _) => {
                        let args = args
                            .iter()
                            .map(|arg| self.resolve_type(symbols, arg, reporter))
                            .collect::<Option<Vec<_>>>()?;
                        Some(Type::app(class, args))
                    }
                    (None, Some(Global::Typedef(id))) => Some(symbols[id].typ().clone()),
                    _ => {
                        reporter.report(Error::UnknownType((*name).into(), *span));
                        None
                    }
                }
            }
            ast::TypeName::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|item| self.resolve_type(symbols, item, reporter))
                    .collect::<Option<Vec<_>>>()?;
                Some(Type::tuple(items))
            }
            ast::TypeName::Function { params, returns } => {
                let params = params
                    .iter()
                    .map(|param| self.resolve_type(symbols, param, reporter))
                    .collect::<Option<Vec<_>>>()?;
                let returns = returns
                    .iter()
                    .map(|ret| self.resolve_type(symbols, ret, reporter))
                    .collect::<Option<Vec<_>>>()?;
                Some(Type::function(params, returns))
            }
            ast::TypeName::Nullable(inner) => {
                Some(Type::nullable(self.resolve_type(symbols, inner, reporter)?))
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    Block,
    /// A lambda body. Variables of enclosing scopes used inside it are captured.
    Lambda,
    /// A scope in which names may also resolve against the members of the given type.
    Inference(Type),
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    entries: IndexMap<Name, Local>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            entries: IndexMap::default(),
        }
    }
}

#[derive(Debug, Clone, EnumAsInner)]
pub enum Local {
    Var(Var),
    Label(LabelInfo),
}

#[derive(Debug, Clone)]
pub struct Var {
    name: Name,
    reg: Register,
    typ: Type,
    assigned: bool,
    effectively_final: bool,
    future: bool,
}

impl Var {
    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn reg(&self) -> Register {
        self.reg
    }

    #[inline]
    pub fn typ(&self) -> &Type {
        &self.typ
    }
}

#[derive(Debug, Clone)]
pub struct LabelInfo {
    name: Name,
    vars: IndexMap<Name, Var>,
}

impl LabelInfo {
    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn var(&self, name: &str) -> Option<&Var> {
        self.vars.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_across_lambdas_capture() {
        let mut ctx = Context::default();
        ctx.declare_var("a", Type::int(), true);
        ctx.with_scope(ScopeKind::Lambda, |ctx| {
            ctx.declare_var("b", Type::int(), true);
            assert!(ctx.lookup("b").is_some());
            assert!(ctx.lookup("a").is_some());
        });
        assert_eq!(ctx.captures().iter().map(|n| &**n).collect::<Vec<_>>(), ["a"]);
        assert!(ctx.lookup("b").is_none());
    }

    #[test]
    fn second_write_ends_effective_finality() {
        let mut ctx = Context::default();
        let reg = ctx.declare_var("x", Type::int(), false);
        ctx.mark_var_write(reg);
        assert!(ctx.is_effectively_final(reg));
        ctx.mark_var_write(reg);
        assert!(!ctx.is_effectively_final(reg));
    }

    #[test]
    fn speculation_leaves_no_trace() {
        let ctx = Context::default();
        ctx.speculate(|ctx| ctx.declare_var("tmp", Type::int(), true));
        assert_eq!(ctx.register_count(), 0);
    }
}
