//! 作用域树：所有节点分配在同一个 arena 中，以下标互相引用。
//!
//! 每个节点只保存一份只追加的本地条目日志，快照即记录日志长度，
//! 回滚即截断日志。节点只会链接到比自己更早创建的节点，因此整棵树不会出现环。

use crate::ast::{Condition, MixinDefinition};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

/// 作用域中登记的一个 mixin 定义及其词法作用域。
#[derive(Debug, Clone)]
pub struct MixinEntry {
    pub definition: Rc<MixinDefinition>,
    pub scope: ScopeId,
}

/// 查找得到的候选 mixin。
#[derive(Debug, Clone)]
pub struct FoundMixin {
    pub entry: MixinEntry,
    /// 途经命名空间上的守卫及各自的求值作用域。
    pub path_guards: Vec<(Condition, ScopeId)>,
}

#[derive(Debug, Clone)]
enum ScopeEntry {
    Variable { name: String, value: Value },
    Mixin(MixinEntry),
}

#[derive(Debug, Clone, Copy)]
enum ScopeLink {
    Root,
    Child(ScopeId),
    /// 先查被调用方整条链，再回退到调用方。
    Join { callee: ScopeId, caller: ScopeId },
}

#[derive(Debug)]
struct ScopeNode {
    link: ScopeLink,
    entries: Vec<ScopeEntry>,
    placeholder: Option<Vec<ScopeEntry>>,
}

impl ScopeNode {
    fn new(link: ScopeLink) -> Self {
        Self {
            link,
            entries: Vec::new(),
            placeholder: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// 单次尝试：回滚时丢弃该作用域新增的条目以及之后创建的所有节点。
    Local,
    /// 保护可复用定义的作用域：只回滚该作用域自身的条目，新节点保留给编译结果使用。
    OriginalPreserving,
}

#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct Snapshot {
    kind: SnapshotKind,
    scope: ScopeId,
    entries: usize,
    nodes: usize,
}

/// 所有作用域节点的存储。
#[derive(Debug)]
pub struct ScopeArena {
    nodes: Vec<ScopeNode>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    pub fn new() -> Self {
        Self {
            nodes: vec![ScopeNode::new(ScopeLink::Root)],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    #[cfg(test)]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_child(&mut self, parent: ScopeId) -> ScopeId {
        self.push_node(ScopeLink::Child(parent))
    }

    /// 不挂在任何链上的独立作用域，用作导出值的容器。
    pub fn create_detached(&mut self) -> ScopeId {
        self.push_node(ScopeLink::Root)
    }

    fn push_node(&mut self, link: ScopeLink) -> ScopeId {
        self.nodes.push(ScopeNode::new(link));
        ScopeId(self.nodes.len() - 1)
    }

    fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: ScopeId) -> &mut ScopeNode {
        &mut self.nodes[id.0]
    }

    pub fn define_variable(&mut self, scope: ScopeId, name: impl Into<String>, value: Value) {
        let name = name.into();
        trace!(scope = scope.0, variable = %name, "define variable");
        self.node_mut(scope)
            .entries
            .push(ScopeEntry::Variable { name, value });
    }

    pub fn define_mixin(&mut self, scope: ScopeId, entry: MixinEntry) {
        self.node_mut(scope).entries.push(ScopeEntry::Mixin(entry));
    }

    /// 按查找优先级遍历可见的作用域，共享祖先只访问一次。
    fn chain(&self, start: ScopeId) -> Chain<'_> {
        Chain {
            arena: self,
            stack: vec![start],
            seen: HashSet::new(),
        }
    }

    pub fn lookup_variable(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        self.chain(scope).find_map(|id| {
            self.node(id).entries.iter().rev().find_map(|entry| match entry {
                ScopeEntry::Variable { name: found, value } if found == name => Some(value),
                _ => None,
            })
        })
    }

    /// 收集可见的同名 mixin；离调用点最近、且含有可接受该实参个数定义的作用域胜出。
    /// `arity` 为 `None` 时不按实参个数过滤。
    pub fn lookup_mixins(
        &self,
        scope: ScopeId,
        name: &str,
        arity: Option<usize>,
    ) -> Vec<FoundMixin> {
        for id in self.chain(scope) {
            let found = self.local_mixins_named(id, name, arity);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// 只在给定作用域自身中查找，不沿链向上。
    pub fn local_mixins_named(
        &self,
        scope: ScopeId,
        name: &str,
        arity: Option<usize>,
    ) -> Vec<FoundMixin> {
        let mut found: Vec<FoundMixin> = Vec::new();
        for entry in &self.node(scope).entries {
            let ScopeEntry::Mixin(mixin) = entry else {
                continue;
            };
            if mixin.definition.name != name {
                continue;
            }
            if let Some(arity) = arity {
                if !mixin.definition.accepts_arity(arity) {
                    continue;
                }
            }
            // 同一个定义被多次导入时只保留最新的闭包作用域
            if let Some(existing) = found
                .iter_mut()
                .find(|candidate| Rc::ptr_eq(&candidate.entry.definition, &mixin.definition))
            {
                existing.entry = mixin.clone();
                continue;
            }
            found.push(FoundMixin {
                entry: mixin.clone(),
                path_guards: Vec::new(),
            });
        }
        found
    }

    /// 作用域自身的变量，同名时后声明者覆盖先声明者。
    pub fn local_variables(&self, scope: ScopeId) -> IndexMap<String, Value> {
        let mut variables = IndexMap::new();
        for entry in &self.node(scope).entries {
            if let ScopeEntry::Variable { name, value } = entry {
                variables.insert(name.clone(), value.clone());
            }
        }
        variables
    }

    pub fn local_mixins(&self, scope: ScopeId) -> Vec<MixinEntry> {
        self.node(scope)
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ScopeEntry::Mixin(mixin) => Some(mixin.clone()),
                ScopeEntry::Variable { .. } => None,
            })
            .collect()
    }

    pub fn is_reachable(&self, from: ScopeId, target: ScopeId) -> bool {
        self.chain(from).any(|id| id == target)
    }

    /// 组合调用方与被调用方：优先解析被调用方，回退到调用方，两者都不会被修改。
    /// 调用方已是被调用方祖先时直接返回被调用方，避免链上出现重复片段。
    pub fn join(&mut self, caller: ScopeId, callee: ScopeId) -> ScopeId {
        if self.is_reachable(callee, caller) {
            return callee;
        }
        self.push_node(ScopeLink::Join { callee, caller })
    }

    pub fn snapshot(&self, scope: ScopeId, kind: SnapshotKind) -> Snapshot {
        Snapshot {
            kind,
            scope,
            entries: self.node(scope).entries.len(),
            nodes: self.nodes.len(),
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        if snapshot.kind == SnapshotKind::Local {
            self.nodes.truncate(snapshot.nodes);
        }
        self.node_mut(snapshot.scope)
            .entries
            .truncate(snapshot.entries);
    }

    pub fn open_placeholder(&mut self, scope: ScopeId) {
        let node = self.node_mut(scope);
        debug_assert!(node.placeholder.is_none(), "占位区重复打开");
        node.placeholder = Some(Vec::new());
    }

    /// 把导出作用域中的条目暂存到占位区，提交前对查找不可见。
    pub fn add_to_placeholder(&mut self, scope: ScopeId, exports: ScopeId) {
        let staged = self.node(exports).entries.clone();
        self.node_mut(scope)
            .placeholder
            .get_or_insert_with(Vec::new)
            .extend(staged);
    }

    /// 一次性提交占位区。调用方已有同名本地变量时，导入的变量不会覆盖它。
    pub fn close_placeholder(&mut self, scope: ScopeId) {
        let node = self.node_mut(scope);
        let Some(staged) = node.placeholder.take() else {
            return;
        };
        let existing: HashSet<String> = node
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ScopeEntry::Variable { name, .. } => Some(name.clone()),
                ScopeEntry::Mixin(_) => None,
            })
            .collect();
        for entry in staged {
            if let ScopeEntry::Variable { name, .. } = &entry {
                if existing.contains(name) {
                    trace!(scope = scope.0, variable = %name, "import shadowed by caller");
                    continue;
                }
            }
            node.entries.push(entry);
        }
    }
}

struct Chain<'a> {
    arena: &'a ScopeArena,
    stack: Vec<ScopeId>,
    seen: HashSet<ScopeId>,
}

impl Iterator for Chain<'_> {
    type Item = ScopeId;

    fn next(&mut self) -> Option<ScopeId> {
        while let Some(id) = self.stack.pop() {
            if !self.seen.insert(id) {
                continue;
            }
            match self.arena.node(id).link {
                ScopeLink::Root => {}
                ScopeLink::Child(parent) => self.stack.push(parent),
                ScopeLink::Join { callee, caller } => {
                    self.stack.push(caller);
                    self.stack.push(callee);
                }
            }
            return Some(id);
        }
        None
    }
}
