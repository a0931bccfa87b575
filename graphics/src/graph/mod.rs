//! Two-level frame graph.
//!
//! Passes are typed containers of [`RenderNode`]s. Both levels carry their
//! own `from -> to` edges ("from executes before to"). Registration fills a
//! pending set; [`FrameGraph::setup`] validates it, sorts passes and nodes,
//! and moves every node under its pass in sorted order. The stage drivers
//! then walk that order each frame.
//!
//! | State | Reached by |
//! |-------|------------|
//! | [`GraphState::Empty`] | [`FrameGraph::new`], [`FrameGraph::clear`] |
//! | [`GraphState::Pending`] | any registration call |
//! | [`GraphState::Built`] | a successful [`FrameGraph::setup`] |
//!
//! # Example
//!
//! ```
//! use ironframe_graphics::graph::{FrameGraph, PassType, RenderNode};
//!
//! struct Noop;
//! impl RenderNode<()> for Noop {}
//!
//! let mut graph = FrameGraph::<()>::new();
//! graph.add_pass("geometry", PassType::Render).unwrap();
//! graph.add_pass("post", PassType::Compute).unwrap();
//! graph.add_pass_edge("geometry", "post").unwrap();
//! graph.add_node(Noop, "gbuffer", "geometry").unwrap();
//! graph.add_node(Noop, "bloom", "post").unwrap();
//! graph.setup().unwrap();
//!
//! let order: Vec<_> = graph.passes().map(|pass| pass.name()).collect();
//! assert_eq!(order, ["geometry", "post"]);
//! ```

mod node;

use std::collections::HashMap;
use std::fmt;

pub use crate::compiler::GraphError;
pub use node::{NodeContext, RecordContext, RenderNode};

use crate::compiler::{BackEdge, topological_sort};
use crate::error::GraphicsError;

/// Kind of work a pass groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    Render,
    Compute,
}

impl fmt::Display for PassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render => f.write_str("render"),
            Self::Compute => f.write_str("compute"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Empty,
    Pending,
    Built,
}

struct PendingPass {
    name: String,
    pass_type: PassType,
}

struct PendingNode<W> {
    name: String,
    pass: String,
    node: Box<dyn RenderNode<W>>,
}

struct OrderedNode<W> {
    name: String,
    node: Box<dyn RenderNode<W>>,
}

/// A pass of the built graph with its nodes in execution order.
pub struct OrderedPass<W> {
    name: String,
    pass_type: PassType,
    nodes: Vec<OrderedNode<W>>,
}

impl<W> OrderedPass<W> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pass_type(&self) -> PassType {
        self.pass_type
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }
}

/// Execution plan computed by setup, before nodes are moved into it.
struct Plan {
    pass_order: Vec<usize>,
    node_order: Vec<usize>,
    node_pass: Vec<usize>,
}

/// Frame graph over a world type `W`.
pub struct FrameGraph<W = ()> {
    passes: Vec<PendingPass>,
    pass_ids: HashMap<String, usize>,
    nodes: Vec<PendingNode<W>>,
    node_ids: HashMap<String, usize>,
    pass_edges: Vec<(String, String)>,
    node_edges: Vec<(String, String)>,
    ordered: Vec<OrderedPass<W>>,
    built: bool,
}

impl<W> FrameGraph<W> {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            pass_ids: HashMap::new(),
            nodes: Vec::new(),
            node_ids: HashMap::new(),
            pass_edges: Vec::new(),
            node_edges: Vec::new(),
            ordered: Vec::new(),
            built: false,
        }
    }

    pub fn state(&self) -> GraphState {
        if self.built {
            GraphState::Built
        } else if self.passes.is_empty()
            && self.nodes.is_empty()
            && self.pass_edges.is_empty()
            && self.node_edges.is_empty()
        {
            GraphState::Empty
        } else {
            GraphState::Pending
        }
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    // -- Registration --

    pub fn add_pass(&mut self, name: impl Into<String>, pass_type: PassType) -> Result<(), GraphError> {
        self.ensure_not_built()?;
        let name = name.into();
        if self.pass_ids.contains_key(&name) {
            return Err(GraphError::DuplicatePass(name));
        }
        self.pass_ids.insert(name.clone(), self.passes.len());
        self.passes.push(PendingPass { name, pass_type });
        Ok(())
    }

    /// Register `node` under `name`, owned by the pass named `pass`.
    ///
    /// The pass does not need to exist yet; it is resolved by
    /// [`setup`](Self::setup).
    pub fn add_node<N>(
        &mut self,
        node: N,
        name: impl Into<String>,
        pass: impl Into<String>,
    ) -> Result<(), GraphError>
    where
        N: RenderNode<W> + 'static,
    {
        self.ensure_not_built()?;
        let name = name.into();
        if self.node_ids.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        self.node_ids.insert(name.clone(), self.nodes.len());
        self.nodes.push(PendingNode {
            name,
            pass: pass.into(),
            node: Box::new(node),
        });
        Ok(())
    }

    /// Order node `from` before node `to`.
    pub fn add_node_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> Result<(), GraphError> {
        self.ensure_not_built()?;
        self.node_edges.push((from.into(), to.into()));
        Ok(())
    }

    /// Order pass `from` before pass `to`.
    pub fn add_pass_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> Result<(), GraphError> {
        self.ensure_not_built()?;
        self.pass_edges.push((from.into(), to.into()));
        Ok(())
    }

    fn ensure_not_built(&self) -> Result<(), GraphError> {
        if self.built {
            Err(GraphError::AlreadyBuilt)
        } else {
            Ok(())
        }
    }

    // -- Build --

    /// Validate and sort the pending registrations into the execution order.
    ///
    /// On error the graph stays pending with every registration intact.
    pub fn setup(&mut self) -> Result<(), GraphError> {
        ironframe_core::profile_function!();
        self.ensure_not_built()?;

        let plan = self.plan()?;

        let mut ordered: Vec<OrderedPass<W>> = Vec::with_capacity(plan.pass_order.len());
        let mut slot_of_pass = vec![0; self.passes.len()];
        for &pass_id in &plan.pass_order {
            let pass = &self.passes[pass_id];
            slot_of_pass[pass_id] = ordered.len();
            ordered.push(OrderedPass {
                name: pass.name.clone(),
                pass_type: pass.pass_type,
                nodes: Vec::new(),
            });
        }

        let mut pending: Vec<Option<PendingNode<W>>> =
            std::mem::take(&mut self.nodes).into_iter().map(Some).collect();
        for &node_id in &plan.node_order {
            if let Some(node) = pending[node_id].take() {
                ordered[slot_of_pass[plan.node_pass[node_id]]]
                    .nodes
                    .push(OrderedNode {
                        name: node.name,
                        node: node.node,
                    });
            }
        }

        self.passes.clear();
        self.pass_ids.clear();
        self.node_ids.clear();
        self.pass_edges.clear();
        self.node_edges.clear();
        self.ordered = ordered;
        self.built = true;

        log::info!(
            "FrameGraph: built {} passes with {} nodes",
            self.ordered.len(),
            self.node_count()
        );
        for pass in &self.ordered {
            log::debug!(
                "FrameGraph: {} pass '{}': [{}]",
                pass.pass_type,
                pass.name,
                pass.node_names().collect::<Vec<_>>().join(", ")
            );
        }
        Ok(())
    }

    /// Resolve names, sort both levels and check node edges against the pass order.
    fn plan(&self) -> Result<Plan, GraphError> {
        let mut pass_adjacency = vec![Vec::new(); self.passes.len()];
        for (from, to) in &self.pass_edges {
            let from_id = self.pass_id(from)?;
            pass_adjacency[from_id].push(self.pass_id(to)?);
        }
        let pass_order = topological_sort(&pass_adjacency).map_err(|edge| self.pass_cycle(edge))?;

        let node_pass = self
            .nodes
            .iter()
            .map(|node| self.pass_id(&node.pass))
            .collect::<Result<Vec<_>, _>>()?;

        let mut pass_rank = vec![0; self.passes.len()];
        for (rank, &pass_id) in pass_order.iter().enumerate() {
            pass_rank[pass_id] = rank;
        }

        let mut node_adjacency = vec![Vec::new(); self.nodes.len()];
        for (from, to) in &self.node_edges {
            let from_id = self.node_id(from)?;
            let to_id = self.node_id(to)?;
            let (from_pass, to_pass) = (node_pass[from_id], node_pass[to_id]);
            if pass_rank[from_pass] > pass_rank[to_pass] {
                return Err(GraphError::CrossPassOrderViolation {
                    from: from.clone(),
                    to: to.clone(),
                    from_pass: self.passes[from_pass].name.clone(),
                    to_pass: self.passes[to_pass].name.clone(),
                });
            }
            node_adjacency[from_id].push(to_id);
        }
        let node_order = topological_sort(&node_adjacency).map_err(|edge| self.node_cycle(edge))?;

        Ok(Plan {
            pass_order,
            node_order,
            node_pass,
        })
    }

    fn pass_id(&self, name: &str) -> Result<usize, GraphError> {
        self.pass_ids
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownPass(name.to_string()))
    }

    fn node_id(&self, name: &str) -> Result<usize, GraphError> {
        self.node_ids
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    fn pass_cycle(&self, edge: BackEdge) -> GraphError {
        GraphError::CyclicDependency {
            from: self.passes[edge.from].name.clone(),
            to: self.passes[edge.to].name.clone(),
        }
    }

    fn node_cycle(&self, edge: BackEdge) -> GraphError {
        GraphError::CyclicDependency {
            from: self.nodes[edge.from].name.clone(),
            to: self.nodes[edge.to].name.clone(),
        }
    }

    /// Drop every pass, node and edge and return to [`GraphState::Empty`].
    pub fn clear(&mut self) {
        let nodes = self.node_count();
        *self = Self::new();
        log::debug!("FrameGraph: cleared ({nodes} nodes dropped)");
    }

    // -- Built graph --

    /// Passes in execution order. Empty until built.
    pub fn passes(&self) -> impl Iterator<Item = &OrderedPass<W>> {
        self.ordered.iter()
    }

    pub fn pass_count(&self) -> usize {
        if self.built {
            self.ordered.len()
        } else {
            self.passes.len()
        }
    }

    pub fn node_count(&self) -> usize {
        if self.built {
            self.ordered.iter().map(OrderedPass::node_count).sum()
        } else {
            self.nodes.len()
        }
    }

    /// Node names in execution order, across all passes.
    pub fn execution_order(&self) -> Vec<&str> {
        self.ordered.iter().flat_map(OrderedPass::node_names).collect()
    }

    // -- Stage drivers --

    /// Run [`RenderNode::declare_resources`] on every node.
    pub fn setup_node_resources(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        self.for_each_node("declare_resources", |node| node.declare_resources(ctx))
    }

    /// Run the one-time [`RenderNode::setup`] stage on every node.
    pub fn setup_nodes(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        self.for_each_node("setup", |node| node.setup(ctx))
    }

    pub fn ready_node_resources(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        self.for_each_node("ready_resources", |node| node.ready_resources(ctx))
    }

    pub fn update_node_resources(
        &mut self,
        ctx: &mut NodeContext<'_>,
        world: &W,
    ) -> Result<(), GraphicsError> {
        self.for_each_node("update_resources", |node| node.update_resources(ctx, world))
    }

    /// Record every node, with one debug marker per pass.
    pub fn record(&mut self, ctx: &mut RecordContext<'_>, world: &W) -> Result<(), GraphicsError> {
        ironframe_core::profile_scope!("FrameGraph::record");
        for pass in &mut self.ordered {
            ctx.marker(&pass.name);
            for entry in &mut pass.nodes {
                entry.node.record(ctx, world).inspect_err(|err| {
                    log::error!("FrameGraph: node '{}' failed in record: {err}", entry.name);
                })?;
            }
        }
        Ok(())
    }

    pub fn draw_ui(&mut self, ui: &egui::Context, world: &W) {
        for pass in &mut self.ordered {
            for entry in &mut pass.nodes {
                entry.node.draw_ui(ui, world);
            }
        }
    }

    fn for_each_node(
        &mut self,
        stage: &str,
        mut f: impl FnMut(&mut dyn RenderNode<W>) -> Result<(), GraphicsError>,
    ) -> Result<(), GraphicsError> {
        for pass in &mut self.ordered {
            for entry in &mut pass.nodes {
                f(entry.node.as_mut()).inspect_err(|err| {
                    log::error!("FrameGraph: node '{}' failed in {stage}: {err}", entry.name);
                })?;
            }
        }
        Ok(())
    }
}

impl<W> Default for FrameGraph<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> fmt::Debug for FrameGraph<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGraph")
            .field("state", &self.state())
            .field("passes", &self.pass_count())
            .field("nodes", &self.node_count())
            .finish()
    }
}
