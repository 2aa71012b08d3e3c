//! The [`Arborist`] facade.

use crate::Result;
use crate::actual::ActualTreeLoader;
use crate::options::{ArboristOptions, LoadActualOptions, LoadVirtualOptions};
use crate::virtual_tree::VirtualTreeLoader;
use arbor_tree::{Arena, NodeId};
use std::path::Path;

/// Loads the trees of one project into an [`Arena`] it owns.
///
/// Each tree is loaded at most once per instance; later calls return the
/// memoized root. Loads take `&mut self`, so two loads can never overlap on
/// the same instance.
#[derive(Debug)]
pub struct Arborist {
    options: ArboristOptions,
    arena: Arena,
    actual_tree: Option<NodeId>,
    virtual_tree: Option<NodeId>,
}

impl Arborist {
    pub fn new(options: ArboristOptions) -> Self {
        Self::with_arena(options, Arena::new())
    }

    /// Load into an existing arena, e.g. one with a custom
    /// [`SpecMatcher`](arbor_tree::SpecMatcher) or trees to transplant onto.
    pub fn with_arena(options: ArboristOptions, arena: Arena) -> Self {
        Self {
            options,
            arena,
            actual_tree: None,
            virtual_tree: None,
        }
    }

    pub fn options(&self) -> &ArboristOptions {
        &self.options
    }

    pub fn path(&self) -> &Path {
        &self.options.path
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn into_arena(self) -> Arena {
        self.arena
    }

    pub fn actual_tree(&self) -> Option<NodeId> {
        self.actual_tree
    }

    pub fn virtual_tree(&self) -> Option<NodeId> {
        self.virtual_tree
    }

    /// Load the tree installed in the project's `node_modules`.
    ///
    /// Every node's dependency flags are recomputed from the root, unless
    /// the tree is transplanted onto `options.root`, whose own flags are
    /// then kept.
    pub async fn load_actual(&mut self, options: LoadActualOptions) -> Result<NodeId> {
        if let Some(tree) = self.actual_tree {
            return Ok(tree);
        }
        let tree = ActualTreeLoader::new(&mut self.arena, &self.options, &options)
            .load(options.root)
            .await?;
        let rerooted = options.root.is_some();
        if !rerooted {
            self.arena.reset_extraneous(tree);
        }
        self.arena.calc_dep_flags(tree, !rerooted);
        self.arena.refresh_meta(tree);
        self.arena.tree_check(tree)?;
        self.actual_tree = Some(tree);
        Ok(tree)
    }

    /// Load the tree described by the project's lockfile.
    ///
    /// Fails with `ENOLOCK` when there is no lockfile and no root was
    /// supplied.
    pub async fn load_virtual(&mut self, options: LoadVirtualOptions) -> Result<NodeId> {
        if let Some(tree) = self.virtual_tree {
            return Ok(tree);
        }
        let tree = VirtualTreeLoader::new(&mut self.arena, &self.options)
            .load(options)
            .await?;
        self.virtual_tree = Some(tree);
        Ok(tree)
    }

    /// Whether `id` can be removed in favour of a copy higher up, honouring
    /// the instance's `prefer_dedupe` option.
    pub fn can_dedupe(&self, id: NodeId, explicit_request: bool) -> bool {
        self.arena
            .can_dedupe(id, self.options.prefer_dedupe, explicit_request)
    }
}
