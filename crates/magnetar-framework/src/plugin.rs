use crate::cycle_state::CycleState;
use crate::status::Status;
use async_trait::async_trait;
use magnetar_core::{Node, Pod};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The named stages of the scheduling pipeline at which plugins may
/// contribute a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionPoint {
    QueueSort,
    PreFilter,
    Filter,
    PostFilter,
    PreScore,
    Score,
    Reserve,
    Permit,
    PreBind,
    Bind,
    PostBind,
}

impl fmt::Display for ExtensionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtensionPoint::QueueSort => "QueueSort",
            ExtensionPoint::PreFilter => "PreFilter",
            ExtensionPoint::Filter => "Filter",
            ExtensionPoint::PostFilter => "PostFilter",
            ExtensionPoint::PreScore => "PreScore",
            ExtensionPoint::Score => "Score",
            ExtensionPoint::Reserve => "Reserve",
            ExtensionPoint::Permit => "Permit",
            ExtensionPoint::PreBind => "PreBind",
            ExtensionPoint::Bind => "Bind",
            ExtensionPoint::PostBind => "PostBind",
        };
        write!(f, "{}", s)
    }
}

/// Per-node status map handed to PostFilter: which nodes Filter removed, and
/// why
pub type NodeStatusMap = HashMap<String, Status>;

/// A node name with an aggregate or per-plugin score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeScore {
    /// Node name
    pub node: String,
    /// Score (higher is better)
    pub score: i64,
}

impl NodeScore {
    pub fn new(node: impl Into<String>, score: i64) -> Self {
        Self {
            node: node.into(),
            score,
        }
    }
}

/// Base trait every plugin implements
pub trait Plugin: Send + Sync {
    /// Name of the plugin, as referenced by the scheduling profile
    fn name(&self) -> &str;
}

/// Orders the pending-pod queue; at most one may be registered
pub trait QueueSortPlugin: Plugin {
    /// Whether `a` should be scheduled before `b`
    fn less(&self, a: &Pod, b: &Pod) -> bool;
}

/// Informational AddPod/RemovePod sub-capability of PreFilter plugins.
///
/// Lets a plugin incrementally update state it computed in PreFilter when
/// the set of pods assumed on a node changes mid-cycle.
#[async_trait]
pub trait PreFilterExtensions: Send + Sync {
    async fn add_pod(
        &self,
        state: &mut CycleState,
        pod: &Pod,
        pod_to_add: &Pod,
        node: &Node,
    ) -> Status;

    async fn remove_pod(
        &self,
        state: &mut CycleState,
        pod: &Pod,
        pod_to_remove: &Pod,
        node: &Node,
    ) -> Status;
}

/// Runs once for the whole pod before per-node work
#[async_trait]
pub trait PreFilterPlugin: Plugin {
    async fn pre_filter(&self, state: &mut CycleState, pod: &Pod, nodes: &[Node]) -> Status;

    /// The AddPod/RemovePod sub-capability, if this plugin declares it
    fn extensions(&self) -> Option<&dyn PreFilterExtensions> {
        None
    }
}

/// Decides whether a pod can run on one node; runs once per candidate node
#[async_trait]
pub trait FilterPlugin: Plugin {
    async fn filter(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> Status;
}

/// Invoked only when Filter removed every candidate node; may nominate a
/// node for reconsideration
#[async_trait]
pub trait PostFilterPlugin: Plugin {
    async fn post_filter(
        &self,
        state: &mut CycleState,
        pod: &Pod,
        rejections: &NodeStatusMap,
    ) -> (Option<String>, Status);
}

/// Runs once for the whole pod before scoring
#[async_trait]
pub trait PreScorePlugin: Plugin {
    async fn pre_score(&self, state: &mut CycleState, pod: &Pod, nodes: &[Node]) -> Status;
}

/// Rescales a plugin's own per-node scores as a batch
#[async_trait]
pub trait ScoreExtensions: Send + Sync {
    async fn normalize_score(
        &self,
        state: &CycleState,
        pod: &Pod,
        scores: &mut [NodeScore],
    ) -> Status;
}

/// Yields an integer score per surviving node
#[async_trait]
pub trait ScorePlugin: Plugin {
    async fn score(&self, state: &CycleState, pod: &Pod, node: &Node) -> (i64, Status);

    /// The NormalizeScore sub-capability, if this plugin declares it
    fn score_extensions(&self) -> Option<&dyn ScoreExtensions> {
        None
    }
}

/// Takes a tentative resource hold for the selected node.
///
/// `unreserve` is the corresponding release operation, invoked when a later
/// phase fails; it must be idempotent since it may run after partial
/// completion.
#[async_trait]
pub trait ReservePlugin: Plugin {
    async fn reserve(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> Status;

    async fn unreserve(&self, state: &mut CycleState, pod: &Pod, node: &Node);
}

/// Approves, denies, or suspends the pod ahead of binding.
///
/// This is the only extension point allowed to return [`Status::wait`].
#[async_trait]
pub trait PermitPlugin: Plugin {
    async fn permit(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> Status;
}

/// Prepares the permitted node ahead of binding (e.g. provisioning volumes)
#[async_trait]
pub trait PreBindPlugin: Plugin {
    async fn pre_bind(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> Status;
}

/// Performs the binding call.
///
/// The first plugin not returning Skip owns the bind and short-circuits the
/// rest of the Bind chain.
#[async_trait]
pub trait BindPlugin: Plugin {
    async fn bind(&self, state: &mut CycleState, pod: &Pod, node: &Node) -> Status;
}

/// Informational cleanup after a confirmed successful bind; cannot affect
/// the outcome
#[async_trait]
pub trait PostBindPlugin: Plugin {
    async fn post_bind(&self, state: &mut CycleState, pod: &Pod, node: &Node);
}

/// A plugin's declared capability set.
///
/// Built by the plugin's factory at registration time; the registry and
/// runner consult this record instead of probing types at runtime. A plugin
/// implementing several extension points clones one `Arc` of itself into
/// each slot.
pub struct PluginCapabilities {
    name: String,
    pub(crate) queue_sort: Option<Arc<dyn QueueSortPlugin>>,
    pub(crate) pre_filter: Option<Arc<dyn PreFilterPlugin>>,
    pub(crate) filter: Option<Arc<dyn FilterPlugin>>,
    pub(crate) post_filter: Option<Arc<dyn PostFilterPlugin>>,
    pub(crate) pre_score: Option<Arc<dyn PreScorePlugin>>,
    pub(crate) score: Option<Arc<dyn ScorePlugin>>,
    pub(crate) reserve: Option<Arc<dyn ReservePlugin>>,
    pub(crate) permit: Option<Arc<dyn PermitPlugin>>,
    pub(crate) pre_bind: Option<Arc<dyn PreBindPlugin>>,
    pub(crate) bind: Option<Arc<dyn BindPlugin>>,
    pub(crate) post_bind: Option<Arc<dyn PostBindPlugin>>,
}

impl PluginCapabilities {
    /// Start an empty capability record for a named plugin
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue_sort: None,
            pre_filter: None,
            filter: None,
            post_filter: None,
            pre_score: None,
            score: None,
            reserve: None,
            permit: None,
            pre_bind: None,
            bind: None,
            post_bind: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_queue_sort(mut self, plugin: Arc<dyn QueueSortPlugin>) -> Self {
        self.queue_sort = Some(plugin);
        self
    }

    pub fn with_pre_filter(mut self, plugin: Arc<dyn PreFilterPlugin>) -> Self {
        self.pre_filter = Some(plugin);
        self
    }

    pub fn with_filter(mut self, plugin: Arc<dyn FilterPlugin>) -> Self {
        self.filter = Some(plugin);
        self
    }

    pub fn with_post_filter(mut self, plugin: Arc<dyn PostFilterPlugin>) -> Self {
        self.post_filter = Some(plugin);
        self
    }

    pub fn with_pre_score(mut self, plugin: Arc<dyn PreScorePlugin>) -> Self {
        self.pre_score = Some(plugin);
        self
    }

    pub fn with_score(mut self, plugin: Arc<dyn ScorePlugin>) -> Self {
        self.score = Some(plugin);
        self
    }

    pub fn with_reserve(mut self, plugin: Arc<dyn ReservePlugin>) -> Self {
        self.reserve = Some(plugin);
        self
    }

    pub fn with_permit(mut self, plugin: Arc<dyn PermitPlugin>) -> Self {
        self.permit = Some(plugin);
        self
    }

    pub fn with_pre_bind(mut self, plugin: Arc<dyn PreBindPlugin>) -> Self {
        self.pre_bind = Some(plugin);
        self
    }

    pub fn with_bind(mut self, plugin: Arc<dyn BindPlugin>) -> Self {
        self.bind = Some(plugin);
        self
    }

    pub fn with_post_bind(mut self, plugin: Arc<dyn PostBindPlugin>) -> Self {
        self.post_bind = Some(plugin);
        self
    }

    /// Whether this plugin declared the given extension point
    pub fn implements(&self, point: ExtensionPoint) -> bool {
        match point {
            ExtensionPoint::QueueSort => self.queue_sort.is_some(),
            ExtensionPoint::PreFilter => self.pre_filter.is_some(),
            ExtensionPoint::Filter => self.filter.is_some(),
            ExtensionPoint::PostFilter => self.post_filter.is_some(),
            ExtensionPoint::PreScore => self.pre_score.is_some(),
            ExtensionPoint::Score => self.score.is_some(),
            ExtensionPoint::Reserve => self.reserve.is_some(),
            ExtensionPoint::Permit => self.permit.is_some(),
            ExtensionPoint::PreBind => self.pre_bind.is_some(),
            ExtensionPoint::Bind => self.bind.is_some(),
            ExtensionPoint::PostBind => self.post_bind.is_some(),
        }
    }
}
