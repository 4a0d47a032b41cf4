use std::cell::Cell;
use std::{fmt, ops};

use bitfield_struct::bitfield;
use smallvec::{SmallVec, smallvec};
use vesper_ast::{self as ast, Span};
use vesper_bytecode::{InPlaceOp, Sequential};

use super::invoke::InvokeExpr;
use super::name::NameExpr;
use crate::constant::Constant;
use crate::fit::TypeFit;
use crate::types::{MethodId, Type, TypeList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An arena of expression nodes. Nodes refer to their children and parent by [`ExprId`], and
/// replacing a child is the only way the shape of the tree changes after lowering.
#[derive(Debug, Clone, Default)]
pub struct ExprTree<'src> {
    nodes: Vec<Node<'src>>,
}

impl<'src> ExprTree<'src> {
    pub(super) fn push(&mut self, kind: ExprKind<'src>, span: Span) -> ExprId {
        let id = ExprId::new(self.nodes.len());
        for child in kind.children() {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            span,
            parent: None,
            state: NodeState::Unvalidated,
            flags: Cell::new(NodeFlags::new()),
        });
        id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub(super) fn kind_mut(&mut self, id: ExprId) -> &mut ExprKind<'src> {
        &mut self.nodes[id.index()].kind
    }

    /// Points `parent` at `new` wherever it pointed at `old`.
    pub(super) fn replace_child(&mut self, parent: ExprId, old: ExprId, new: ExprId) {
        for slot in self.nodes[parent.index()].kind.children_mut() {
            if *slot == old {
                *slot = new;
            }
        }
        self.nodes[new.index()].parent = Some(parent);
    }

    /// Adds a node that takes the place of `inner` under its current parent. The parent's
    /// reference is updated by whoever applies the replacement.
    pub(super) fn wrap(&mut self, inner: ExprId, kind: ExprKind<'src>) -> ExprId {
        let parent = self[inner].parent;
        let span = self[inner].span;
        let id = self.push(kind, span);
        self.nodes[id.index()].parent = parent;
        id
    }

    /// Records the outcome of validation. A node is committed exactly once per validation pass.
    pub(super) fn commit(&mut self, id: ExprId, validated: Validated) {
        self.nodes[id.index()].state = NodeState::Validated(validated);
    }

    pub(super) fn update_flags(&self, id: ExprId, f: impl FnOnce(NodeFlags) -> NodeFlags) {
        let flags = &self[id].flags;
        flags.set(f(flags.get()));
    }

    /// Saves the subtree rooted at `root` so that speculative validation can be undone.
    pub(super) fn checkpoint(&self, root: ExprId) -> Checkpoint<'src> {
        let mut saved = Vec::new();
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            let node = self[id].clone();
            pending.extend(node.kind.children());
            saved.push((id, node));
        }
        Checkpoint {
            len: self.nodes.len(),
            saved,
        }
    }

    pub(super) fn restore(&mut self, checkpoint: Checkpoint<'src>) {
        self.nodes.truncate(checkpoint.len);
        for (id, node) in checkpoint.saved {
            self.nodes[id.index()] = node;
        }
    }
}

impl<'src> ops::Index<ExprId> for ExprTree<'src> {
    type Output = Node<'src>;

    #[inline]
    fn index(&self, id: ExprId) -> &Self::Output {
        &self.nodes[id.index()]
    }
}

#[derive(Debug)]
pub(super) struct Checkpoint<'src> {
    len: usize,
    saved: Vec<(ExprId, Node<'src>)>,
}

#[derive(Debug, Clone)]
pub struct Node<'src> {
    kind: ExprKind<'src>,
    span: Span,
    parent: Option<ExprId>,
    state: NodeState,
    flags: Cell<NodeFlags>,
}

impl<'src> Node<'src> {
    #[inline]
    pub fn kind(&self) -> &ExprKind<'src> {
        &self.kind
    }

    #[inline]
    pub fn span(&self) -> Span {
        self.span
    }

    #[inline]
    pub fn parent(&self) -> Option<ExprId> {
        self.parent
    }

    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.flags.get()
    }

    #[inline]
    pub fn is_validated(&self) -> bool {
        matches!(self.state, NodeState::Validated(_))
    }

    /// The outcome of validation, available once the node has been validated.
    #[inline]
    pub fn validated(&self) -> Option<&Validated> {
        match &self.state {
            NodeState::Validated(validated) => Some(validated),
            NodeState::Unvalidated => None,
        }
    }

    /// The outcome of validation, for code that only runs after validation succeeded.
    pub(super) fn expect_validated(&self) -> &Validated {
        match &self.state {
            NodeState::Validated(validated) => validated,
            NodeState::Unvalidated => unreachable!("expression used before validation"),
        }
    }
}

#[derive(Debug, Clone)]
enum NodeState {
    Unvalidated,
    Validated(Validated),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    fit: TypeFit,
    types: TypeList,
    consts: Option<SmallVec<[Constant; 1]>>,
}

impl Validated {
    pub(super) fn new(
        fit: TypeFit,
        types: TypeList,
        consts: Option<SmallVec<[Constant; 1]>>,
    ) -> Self {
        Self { fit, types, consts }
    }

    pub(super) fn single(fit: TypeFit, typ: Type, constant: Option<Constant>) -> Self {
        Self::new(fit, smallvec![typ], constant.map(|c| smallvec![c]))
    }

    #[inline]
    pub fn fit(&self) -> TypeFit {
        self.fit
    }

    #[inline]
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// The single result type, or `None` for a void expression.
    #[inline]
    pub fn typ(&self) -> Option<&Type> {
        self.types.first()
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        self.consts.is_some()
    }

    #[inline]
    pub fn consts(&self) -> Option<&[Constant]> {
        self.consts.as_deref()
    }

    #[inline]
    pub fn constant(&self) -> Option<&Constant> {
        self.consts.as_ref().and_then(|consts| consts.first())
    }
}

#[bitfield(u8)]
pub struct NodeFlags {
    /// Set while the node generates into assignment sinks.
    pub in_assignment: bool,
    /// Set once an illegal short circuit has been reported for the node.
    pub illegal_short_circuit: bool,
    #[bits(6)]
    __: u8,
}

#[derive(Debug, Clone)]
pub enum ExprKind<'src> {
    Literal(Constant),
    Tuple {
        items: Box<[ExprId]>,
        /// Set when the tuple supplies its elements as separate values.
        unpacked: bool,
    },
    Name(NameExpr<'src>),
    Invoke(InvokeExpr),
    /// `_` or `<T> _`, an argument left open for partial application.
    NonBinding(Option<ast::SourceTypeName<'src>>),
    Sequential {
        op: Sequential,
        operand: ExprId,
    },
    Assign {
        op: Option<InPlaceOp>,
        place: ExprId,
        value: ExprId,
    },
    Index {
        target: ExprId,
        indices: Box<[ExprId]>,
        getter: Option<MethodId>,
    },
    NotNull(ExprId),
    /// Applies implicit conversions to the values of the inner expression. Positions without a
    /// conversion pass through unchanged.
    Convert {
        inner: ExprId,
        conversions: Box<[Option<MethodId>]>,
    },
}

impl ExprKind<'_> {
    /// The direct children of the node in evaluation order.
    pub fn children(&self) -> SmallVec<[ExprId; 4]> {
        match self {
            Self::Literal(_) | Self::NonBinding(_) => smallvec![],
            Self::Tuple { items, .. } => items.iter().copied().collect(),
            Self::Name(name) => name.left.into_iter().collect(),
            Self::Invoke(invoke) => std::iter::once(invoke.callee)
                .chain(invoke.args.iter().map(|arg| arg.value))
                .collect(),
            Self::Sequential { operand, .. } => smallvec![*operand],
            Self::Assign { place, value, .. } => smallvec![*place, *value],
            Self::Index {
                target, indices, ..
            } => std::iter::once(*target)
                .chain(indices.iter().copied())
                .collect(),
            Self::NotNull(inner) | Self::Convert { inner, .. } => smallvec![*inner],
        }
    }

    fn children_mut(&mut self) -> SmallVec<[&mut ExprId; 4]> {
        match self {
            Self::Literal(_) | Self::NonBinding(_) => smallvec![],
            Self::Tuple { items, .. } => items.iter_mut().collect(),
            Self::Name(name) => name.left.iter_mut().collect(),
            Self::Invoke(invoke) => std::iter::once(&mut invoke.callee)
                .chain(invoke.args.iter_mut().map(|arg| &mut arg.value))
                .collect(),
            Self::Sequential { operand, .. } => smallvec![operand],
            Self::Assign { place, value, .. } => smallvec![place, value],
            Self::Index {
                target, indices, ..
            } => std::iter::once(target).chain(indices.iter_mut()).collect(),
            Self::NotNull(inner) | Self::Convert { inner, .. } => smallvec![inner],
        }
    }
}
