use std::collections::BTreeMap;
use std::fmt::Write as _;

use uuid::Uuid;

use watershed_core::types::Cost;

use crate::error::{FlowError, FlowResult};
use crate::graph::{FlowNodeKind, GraphModel};

/// Stable wire codes for node kinds, carried in `c nt` annotation lines.
fn kind_code(kind: FlowNodeKind) -> u8 {
    match kind {
        FlowNodeKind::Root => 0,
        FlowNodeKind::JobAggregate => 1,
        FlowNodeKind::UnscheduledTask => 2,
        FlowNodeKind::ScheduledTask => 3,
        FlowNodeKind::RootTask => 4,
        FlowNodeKind::EquivClassAgg => 5,
        FlowNodeKind::Resource => 6,
        FlowNodeKind::Pu => 7,
        FlowNodeKind::Sink => 8,
        FlowNodeKind::ClusterAgg => 9,
        FlowNodeKind::Machine => 10,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimacsNode {
    pub id: u64,
    pub kind_code: u8,
    pub task: Option<u64>,
    pub resource: Option<Uuid>,
    pub equiv_class: Option<u64>,
    pub supply: i64,
}

/// Flat view of a flow network as it crosses the solver boundary. Emitted
/// graphs reparse into an equal value, which is the round-trip contract the
/// dispatcher relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimacsGraph {
    pub nodes: BTreeMap<u64, DimacsNode>,
    pub arcs: Vec<(u64, u64, u64, u64, Cost)>,
}

impl DimacsGraph {
    pub fn from_model(graph: &GraphModel) -> Self {
        let mut nodes = BTreeMap::new();
        let mut arcs = Vec::with_capacity(graph.num_arcs());
        for id in graph.sorted_node_ids() {
            let node = graph.node(id).expect("sorted ids come from the graph");
            nodes.insert(
                id,
                DimacsNode {
                    id,
                    kind_code: kind_code(node.kind),
                    task: node.task,
                    resource: node.resource,
                    equiv_class: node.equiv_class,
                    supply: node.supply,
                },
            );
        }
        for id in graph.sorted_node_ids() {
            for arc in graph.iterate_arcs(id) {
                arcs.push((arc.src, arc.dst, arc.cap_lower, arc.cap_upper, arc.cost));
            }
        }
        Self { nodes, arcs }
    }
}

/// Serializes the graph in DIMACS min-cost-flow format. The `c nt` node
/// annotations are comments to a standard solver, so the output remains a
/// strict superset of plain DIMACS.
pub fn serialize_graph(graph: &GraphModel) -> String {
    let view = DimacsGraph::from_model(graph);
    let mut out = String::new();
    writeln!(
        out,
        "p min {} {}",
        graph.max_node_id(),
        view.arcs.len()
    )
    .unwrap();
    for node in view.nodes.values() {
        write!(out, "c nt {} {}", node.id, node.kind_code).unwrap();
        if let Some(task) = node.task {
            write!(out, " t {task}").unwrap();
        }
        if let Some(resource) = node.resource {
            write!(out, " r {resource}").unwrap();
        }
        if let Some(ec) = node.equiv_class {
            write!(out, " e {ec}").unwrap();
        }
        out.push('\n');
    }
    for node in view.nodes.values() {
        if node.supply != 0 {
            writeln!(out, "n {} {}", node.id, node.supply).unwrap();
        }
    }
    for (src, dst, lb, ub, cost) in &view.arcs {
        writeln!(out, "a {src} {dst} {lb} {ub} {cost}").unwrap();
    }
    out
}

fn parse_error(line_no: usize, line: &str) -> FlowError {
    FlowError::Parse(format!("malformed DIMACS line {}: {line}", line_no + 1))
}

/// Reparses a serialized graph; the inverse of `serialize_graph`.
pub fn parse_graph(input: &str) -> FlowResult<DimacsGraph> {
    let mut graph = DimacsGraph::default();
    for (line_no, line) in input.lines().enumerate() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("p") | None => {}
            Some("c") => {
                if fields.next() != Some("nt") {
                    continue;
                }
                let id: u64 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| parse_error(line_no, line))?;
                let kind_code: u8 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| parse_error(line_no, line))?;
                let mut node = DimacsNode {
                    id,
                    kind_code,
                    task: None,
                    resource: None,
                    equiv_class: None,
                    supply: 0,
                };
                while let Some(tag) = fields.next() {
                    let value = fields.next().ok_or_else(|| parse_error(line_no, line))?;
                    match tag {
                        "t" => node.task = Some(value.parse().map_err(|_| parse_error(line_no, line))?),
                        "r" => {
                            node.resource =
                                Some(value.parse().map_err(|_| parse_error(line_no, line))?)
                        }
                        "e" => {
                            node.equiv_class =
                                Some(value.parse().map_err(|_| parse_error(line_no, line))?)
                        }
                        _ => return Err(parse_error(line_no, line)),
                    }
                }
                graph.nodes.insert(id, node);
            }
            Some("n") => {
                let id: u64 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| parse_error(line_no, line))?;
                let supply: i64 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| parse_error(line_no, line))?;
                match graph.nodes.get_mut(&id) {
                    Some(node) => node.supply = supply,
                    None => return Err(FlowError::Parse(format!("supply for unknown node {id}"))),
                }
            }
            Some("a") => {
                let mut next_u64 = || -> FlowResult<u64> {
                    fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .ok_or_else(|| parse_error(line_no, line))
                };
                let src = next_u64()?;
                let dst = next_u64()?;
                let lb = next_u64()?;
                let ub = next_u64()?;
                let cost: Cost = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| parse_error(line_no, line))?;
                graph.arcs.push((src, dst, lb, ub, cost));
            }
            Some(_) => return Err(parse_error(line_no, line)),
        }
    }
    Ok(graph)
}

/// Parses the solver's assignment: `m <task_node> <pu_node>` lines,
/// terminated by `c EOA` or end of input. Order is preserved; the driver
/// applies deltas in this order.
pub fn parse_mappings(output: &str) -> FlowResult<Vec<(u64, u64)>> {
    let mut mappings = Vec::new();
    for (line_no, line) in output.lines().enumerate() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("m") => {
                let task: u64 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| parse_error(line_no, line))?;
                let pu: u64 = fields
                    .next()
                    .and_then(|f| f.parse().ok())
                    .ok_or_else(|| parse_error(line_no, line))?;
                mappings.push((task, pu));
            }
            Some("c") => {
                if fields.next() == Some("EOA") {
                    break;
                }
            }
            Some("s") | None => {}
            Some(other) => {
                return Err(FlowError::Parse(format!(
                    "unexpected solver output record: {other}"
                )))
            }
        }
    }
    Ok(mappings)
}
