use vesper_ast as ast;
use vesper_bytecode::{InPlaceOp, Sequential};

use super::invoke::{InvokeArg, InvokeExpr};
use super::name::NameExpr;
use super::tree::{ExprId, ExprKind, ExprTree};
use crate::constant::{Constant, Float};

/// The name of the method that constructs a new instance of a class.
pub const CONSTRUCT: &str = "construct";

impl<'src> ExprTree<'src> {
    /// Adds a parsed expression to the arena and returns the id of its root.
    pub fn lower(&mut self, (expr, span): &ast::SourceExpr<'src>) -> ExprId {
        let kind = match expr {
            ast::Expr::Ident {
                left,
                name,
                type_args,
                no_deref,
            } => {
                let left = left.as_deref().map(|left| self.lower(left));
                ExprKind::Name(NameExpr::new(left, name, type_args.clone(), *no_deref))
            }
            ast::Expr::Call {
                callee,
                args,
                is_async,
            } => {
                let callee = self.lower(callee);
                let args = self.lower_args(args);
                ExprKind::Invoke(InvokeExpr::new(callee, args).with_async(*is_async))
            }
            ast::Expr::New { typ, args } => {
                let class = self.lower_type_name(typ);
                let callee = self.push(
                    ExprKind::Name(NameExpr::new(Some(class), CONSTRUCT, [].into(), false)),
                    typ.1,
                );
                let args = self.lower_args(args);
                ExprKind::Invoke(InvokeExpr::new(callee, args))
            }
            ast::Expr::Constant(constant) => ExprKind::Literal(match constant {
                ast::Constant::Int(i) => Constant::Int(*i),
                ast::Constant::Float(f) => Constant::Float(Float::from(*f)),
                ast::Constant::Bool(b) => Constant::Bool(*b),
                ast::Constant::Char(c) => Constant::Char(*c),
                ast::Constant::String(s) => Constant::String((*s).into()),
                ast::Constant::Null => Constant::Null,
            }),
            ast::Expr::Tuple(items) => ExprKind::Tuple {
                items: items.iter().map(|item| self.lower(item)).collect(),
                unpacked: false,
            },
            ast::Expr::Index { target, indices } => ExprKind::Index {
                target: self.lower(target),
                indices: indices.iter().map(|index| self.lower(index)).collect(),
                getter: None,
            },
            ast::Expr::IncDec { op, operand } => ExprKind::Sequential {
                op: match op {
                    ast::IncDec::PreInc => Sequential::PreInc,
                    ast::IncDec::PreDec => Sequential::PreDec,
                    ast::IncDec::PostInc => Sequential::PostInc,
                    ast::IncDec::PostDec => Sequential::PostDec,
                },
                operand: self.lower(operand),
            },
            ast::Expr::Assign { op, place, value } => ExprKind::Assign {
                op: op.map(in_place_op),
                place: self.lower(place),
                value: self.lower(value),
            },
            ast::Expr::NotNull(inner) => ExprKind::NotNull(self.lower(inner)),
            ast::Expr::Unbound(typ) => ExprKind::NonBinding(typ.clone()),
        };
        self.push(kind, *span)
    }

    fn lower_args(&mut self, args: &[ast::SourceArg<'src>]) -> Box<[InvokeArg]> {
        args.iter()
            .map(|arg| InvokeArg {
                name: arg.name.map(|(name, span)| (name.into(), span)),
                value: self.lower(&arg.value),
            })
            .collect()
    }

    /// Lowers the class named by a `new` expression into a name with its type arguments.
    fn lower_type_name(&mut self, (typ, span): &ast::SourceTypeName<'src>) -> ExprId {
        let name = match typ {
            ast::TypeName::Named { name, args } => NameExpr::new(None, name, args.clone(), false),
            other => {
                let name: &str = &other.to_string();
                NameExpr::new(None, name, [].into(), false)
            }
        };
        self.push(ExprKind::Name(name), *span)
    }
}

fn in_place_op(op: ast::AssignOp) -> InPlaceOp {
    match op {
        ast::AssignOp::Add => InPlaceOp::Add,
        ast::AssignOp::Sub => InPlaceOp::Sub,
        ast::AssignOp::Mul => InPlaceOp::Mul,
        ast::AssignOp::Div => InPlaceOp::Div,
        ast::AssignOp::Mod => InPlaceOp::Mod,
        ast::AssignOp::Shl => InPlaceOp::Shl,
        ast::AssignOp::Shr => InPlaceOp::Shr,
        ast::AssignOp::ShrAll => InPlaceOp::ShrAll,
        ast::AssignOp::And => InPlaceOp::And,
        ast::AssignOp::Or => InPlaceOp::Or,
        ast::AssignOp::Xor => InPlaceOp::Xor,
    }
}
