//! Dependency Graph and Validation
//!
//! Provides structural checks for a workflow:
//! - Dependency graph induced by workflow-reference locators
//! - Cycle detection (depth-first, with a visiting set)
//! - Deterministic topological ordering
//! - Lint checks for editor feedback

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use log::{debug, info};

use crate::error::{EngineError, Result};

use super::locator::Locator;
use super::model::{OpNode, Workflow, INPUTS_GROUP};

/// Directed graph over the operations of one workflow.
///
/// An edge `A -> B` means some input of `B` references a slot owned by `A`.
/// Nodes are indexed by insertion order in the workflow namespace. Each
/// node also records the workflows it drives through `EntireWorkflow`
/// inputs and whether it is enabled.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    nested: Vec<Vec<String>>,
    enabled: Vec<bool>,
}

impl DependencyGraph {
    /// Builds the graph from every `WorkflowReference` locator.
    ///
    /// A reference to one of the operation's own input slots adds no edge;
    /// those chains are checked during resolution. References to unknown
    /// operations add no edge either and fail when resolved.
    pub fn build(workflow: &Workflow) -> Self {
        let nodes = workflow.operation_names();
        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let enabled = nodes
            .iter()
            .map(|name| workflow.is_op_enabled(name).unwrap_or(true))
            .collect();

        let mut graph = Self {
            successors: vec![Vec::new(); nodes.len()],
            predecessors: vec![Vec::new(); nodes.len()],
            nested: vec![Vec::new(); nodes.len()],
            enabled,
            nodes,
            index,
        };

        for to in 0..graph.nodes.len() {
            let name = graph.nodes[to].clone();
            for (_, locator) in workflow.input_locators(&name).unwrap_or_default() {
                let uri = match locator {
                    Locator::Workflow { uri, .. } => uri,
                    Locator::EntireWorkflow { name: target } => {
                        if !graph.nested[to].contains(target) {
                            graph.nested[to].push(target.clone());
                        }
                        continue;
                    }
                    _ => continue,
                };
                let Some(owner) = uri.first() else {
                    continue;
                };
                if owner == name && uri.segment(1) == Some(INPUTS_GROUP) {
                    continue;
                }
                if let Some(&from) = graph.index.get(owner) {
                    graph.add_edge(from, to);
                }
            }
        }

        debug!(
            "Dependency graph for '{}': {} operations, {} edges",
            workflow.name(),
            graph.nodes.len(),
            graph.edge_count()
        );
        graph
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if !self.successors[from].contains(&to) {
            self.successors[from].push(to);
            self.predecessors[to].push(from);
        }
    }

    /// Operation names in insertion order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Workflows that `name` receives as `EntireWorkflow` inputs.
    pub fn nested_workflows(&self, name: &str) -> &[String] {
        self.index
            .get(name)
            .map_or(&[][..], |&i| self.nested[i].as_slice())
    }

    /// False if the operation was switched off in its workflow.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.index.get(name).map_or(true, |&i| self.enabled[i])
    }

    /// Operations that `name` reads from directly.
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.neighbours(name, &self.predecessors)
    }

    /// Operations that read from `name` directly.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.neighbours(name, &self.successors)
    }

    fn neighbours(&self, name: &str, table: &[Vec<usize>]) -> Vec<String> {
        self.index
            .get(name)
            .map(|&i| table[i].iter().map(|&j| self.nodes[j].clone()).collect())
            .unwrap_or_default()
    }

    /// Every operation downstream of `name`, breadth-first.
    pub fn transitive_dependents(&self, name: &str) -> Vec<String> {
        let Some(&start) = self.index.get(name) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            for &next in &self.successors[current] {
                if seen.insert(next) {
                    result.push(self.nodes[next].clone());
                    queue.push_back(next);
                }
            }
        }

        result
    }

    /// Returns the first cycle found, as a closed path of operation names.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Visiting,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            node: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<String>> {
            marks[node] = Mark::Visiting;
            stack.push(node);

            for &next in &graph.successors[node] {
                match marks[next] {
                    Mark::Visiting => {
                        let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[start..].iter().map(|&n| graph.nodes[n].clone()).collect();
                        path.push(graph.nodes[next].clone());
                        return Some(path);
                    }
                    Mark::Unvisited => {
                        if let Some(path) = visit(graph, next, marks, stack) {
                            return Some(path);
                        }
                    }
                    Mark::Done => {}
                }
            }

            stack.pop();
            marks[node] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut stack = Vec::new();
        for node in 0..self.nodes.len() {
            if marks[node] == Mark::Unvisited {
                if let Some(path) = visit(self, node, &mut marks, &mut stack) {
                    return Some(path);
                }
            }
        }
        None
    }

    /// Orders operations so every dependency comes first.
    ///
    /// Ties are broken by insertion order, so the result is reproducible.
    /// Fails with `CyclicDependency` if the graph has a cycle.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        if let Some(path) = self.find_cycle() {
            return Err(EngineError::CyclicDependency { path });
        }

        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(current)) = ready.pop() {
            order.push(self.nodes[current].clone());
            for &next in &self.successors[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(EngineError::CyclicDependency {
                path: self
                    .nodes
                    .iter()
                    .filter(|n| !order.contains(n))
                    .cloned()
                    .collect(),
            });
        }

        debug!("Topological order: {:?}", order);
        Ok(order)
    }
}

/// Lint findings for a workflow that has not been run yet.
#[derive(Debug, Clone, PartialEq)]
pub enum LintIssue {
    EmptyWorkflow,
    DanglingReference { slot: String, target: String },
    NotASlot { slot: String, target: String },
    MissingRequired { slot: String },
    SelfDrivingWorkflow { slot: String },
    CyclicDependency(Vec<String>),
}

impl std::fmt::Display for LintIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyWorkflow => write!(f, "Workflow has no operations"),
            Self::DanglingReference { slot, target } => {
                write!(f, "'{}' references missing node '{}'", slot, target)
            }
            Self::NotASlot { slot, target } => {
                write!(f, "'{}' references '{}', which is not a slot", slot, target)
            }
            Self::MissingRequired { slot } => {
                write!(f, "'{}' is required but has no source", slot)
            }
            Self::SelfDrivingWorkflow { slot } => {
                write!(f, "'{}' references the workflow that contains it", slot)
            }
            Self::CyclicDependency(path) => {
                write!(f, "Cyclic dependency: {}", path.join(" -> "))
            }
        }
    }
}

/// Checks a workflow's structure and returns its execution order.
pub fn validate_workflow(workflow: &Workflow) -> Result<Vec<String>> {
    info!(
        "Validating workflow '{}' with {} operations",
        workflow.name(),
        workflow.len()
    );
    let order = DependencyGraph::build(workflow).topological_order()?;
    info!("Workflow '{}' validated", workflow.name());
    Ok(order)
}

/// Collects every lint issue without stopping at the first one.
///
/// Useful for editor feedback before a pass is attempted.
pub fn lint_workflow(workflow: &Workflow) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    let names = workflow.operation_names();

    if names.is_empty() {
        issues.push(LintIssue::EmptyWorkflow);
        return issues;
    }

    for name in &names {
        let Ok(node) = workflow.operation(name) else {
            continue;
        };
        for (input, locator) in workflow.input_locators(name).unwrap_or_default() {
            let slot = format!("{}.{}.{}", name, INPUTS_GROUP, input);
            match locator {
                Locator::Workflow { uri, .. } => match workflow.node(uri) {
                    Err(_) => issues.push(LintIssue::DanglingReference {
                        slot,
                        target: uri.to_string(),
                    }),
                    Ok(OpNode::Input(_) | OpNode::Output(_) | OpNode::OutputGroup) => {}
                    Ok(_) => issues.push(LintIssue::NotASlot {
                        slot,
                        target: uri.to_string(),
                    }),
                },
                Locator::EntireWorkflow { name: target } if target == workflow.name() => {
                    issues.push(LintIssue::SelfDrivingWorkflow { slot })
                }
                Locator::None => {
                    let required = node
                        .schema()
                        .input_spec(&input)
                        .map_or(false, |spec| spec.required);
                    if required {
                        issues.push(LintIssue::MissingRequired { slot });
                    }
                }
                _ => {}
            }
        }
    }

    if let Some(path) = DependencyGraph::build(workflow).find_cycle() {
        issues.push(LintIssue::CyclicDependency(path));
    }

    issues
}

/// Lint issues rendered as messages.
pub fn quick_validate(workflow: &Workflow) -> Vec<String> {
    lint_workflow(workflow)
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Double, Emit, Pass};

    fn reference(uri: &str) -> Locator {
        Locator::reference(uri).unwrap()
    }

    fn chain() -> Workflow {
        let mut wf = Workflow::new("chain");
        wf.add_operation("c", "Pass", Box::new(Pass)).unwrap();
        wf.add_operation("a", "Emit", Box::new(Emit::new(1i64))).unwrap();
        wf.add_operation("b", "Pass", Box::new(Pass)).unwrap();
        wf.set_input("b", "input", reference("a.outputs.x")).unwrap();
        wf.set_input("c", "input", reference("b.outputs.out")).unwrap();
        wf
    }

    #[test]
    fn test_edges_follow_references() {
        let graph = DependencyGraph::build(&chain());
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dependencies("b"), vec!["a"]);
        assert_eq!(graph.dependents("b"), vec!["c"]);
        assert_eq!(graph.transitive_dependents("a"), vec!["b", "c"]);
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let order = DependencyGraph::build(&chain()).topological_order().unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let mut wf = Workflow::new("flat");
        for name in ["z", "m", "a"] {
            wf.add_operation(name, "Emit", Box::new(Emit::new(0i64))).unwrap();
        }
        let order = DependencyGraph::build(&wf).topological_order().unwrap();
        assert_eq!(order, vec!["z", "m", "a"]);
    }

    #[test]
    fn test_three_way_cycle_detected() {
        let mut wf = Workflow::new("cycle");
        for name in ["a", "b", "c"] {
            wf.add_operation(name, "Pass", Box::new(Pass)).unwrap();
        }
        wf.set_input("a", "input", reference("c.outputs.out")).unwrap();
        wf.set_input("b", "input", reference("a.outputs.out")).unwrap();
        wf.set_input("c", "input", reference("b.outputs.out")).unwrap();

        let graph = DependencyGraph::build(&wf);
        let path = graph.find_cycle().unwrap();
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 4);

        let err = graph.topological_order().unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency { .. }));
    }

    #[test]
    fn test_own_output_is_a_cycle() {
        let mut wf = Workflow::new("self");
        wf.add_operation("a", "Pass", Box::new(Pass)).unwrap();
        wf.set_input("a", "input", reference("a.outputs.out")).unwrap();

        assert_eq!(
            DependencyGraph::build(&wf).find_cycle(),
            Some(vec!["a".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_own_input_adds_no_edge() {
        let mut wf = Workflow::new("self");
        wf.add_operation("a", "Pass", Box::new(Pass)).unwrap();
        wf.set_input("a", "input", reference("a.inputs.input")).unwrap();

        let graph = DependencyGraph::build(&wf);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_dangling_reference_adds_no_edge() {
        let mut wf = chain();
        wf.remove_operation("a").unwrap();

        let graph = DependencyGraph::build(&wf);
        assert!(!graph.contains("a"));
        assert_eq!(graph.edge_count(), 1);
        assert!(quick_validate(&wf)
            .iter()
            .any(|msg| msg.contains("missing node 'a.outputs.x'")));
    }

    #[test]
    fn test_nested_workflows_and_enabled_flags() {
        let mut wf = chain();
        wf.set_input("b", "input", Locator::workflow("inner")).unwrap();
        wf.set_op_enabled("c", false).unwrap();

        let graph = DependencyGraph::build(&wf);
        assert_eq!(graph.nested_workflows("b"), ["inner".to_string()]);
        assert!(graph.nested_workflows("c").is_empty());
        assert!(graph.nested_workflows("ghost").is_empty());
        assert!(graph.is_enabled("b"));
        assert!(!graph.is_enabled("c"));
        assert_eq!(graph.dependencies("b"), Vec::<String>::new());
    }

    #[test]
    fn test_validate_workflow_returns_order() {
        assert_eq!(validate_workflow(&chain()).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_lint_empty_and_required() {
        let wf = Workflow::new("empty");
        assert_eq!(lint_workflow(&wf), vec![LintIssue::EmptyWorkflow]);

        let mut wf = Workflow::new("needs");
        wf.add_operation("d", "Double", Box::new(Double)).unwrap();
        let issues = lint_workflow(&wf);
        assert_eq!(
            issues,
            vec![LintIssue::MissingRequired {
                slot: "d.inputs.y".to_string()
            }]
        );
    }

    #[test]
    fn test_lint_self_driving_workflow() {
        let mut wf = Workflow::new("outer");
        wf.add_operation("p", "Pass", Box::new(Pass)).unwrap();
        wf.set_input("p", "input", Locator::workflow("outer")).unwrap();

        let messages = quick_validate(&wf);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("references the workflow that contains it"));
    }

    #[test]
    fn test_lint_issue_display() {
        let issue = LintIssue::CyclicDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(issue.to_string(), "Cyclic dependency: a -> b -> a");
    }
}
