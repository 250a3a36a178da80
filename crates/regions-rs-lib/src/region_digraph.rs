//! Directed graph of isolated regions.
//!
//! An edge `tail -> head` carries a [`RegionFilter`]: capabilities living in `head` (or reachable from it)
//! that pass the filter are visible to requirers in `tail`.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use petgraph::prelude::*;
use petgraph::visit::IntoEdgeReferences;

mod region_filter;
pub use region_filter::*;
mod snapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
	name: String,
	bundle_ids: BTreeSet<u64>,
}

impl Region {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), bundle_ids: BTreeSet::new() }
	}

	pub fn name(&self) -> &str { &self.name }
	pub fn bundle_ids(&self) -> &BTreeSet<u64> { &self.bundle_ids }

	pub fn add_bundle(&mut self, bundle_id: u64) {
		self.bundle_ids.insert(bundle_id);
	}

	pub fn contains_bundle(&self, bundle_id: u64) -> bool {
		self.bundle_ids.contains(&bundle_id)
	}
}

#[derive(Debug, Clone, Default)]
pub struct RegionDigraph {
	graph: StableDiGraph<Region, RegionFilter>,
	index: BTreeMap<String, NodeIndex>,
}

impl RegionDigraph {
	pub fn new() -> Self { Self::default() }

	pub fn create_region(&mut self, name: impl Into<String>) -> crate::Result<()> {
		let name = name.into();
		if self.index.contains_key(&name) {
			return Err(crate::Error::AlreadyExists(format!("region {}", name)));
		}
		let node = self.graph.add_node(Region::new(name.clone()));
		self.index.insert(name, node);
		Ok(())
	}

	pub fn region(&self, name: &str) -> Option<&Region> {
		self.index.get(name).map(|n| &self.graph[*n])
	}

	pub fn region_mut(&mut self, name: &str) -> Option<&mut Region> {
		self.index.get(name).copied().map(move |n| &mut self.graph[n])
	}

	/// Regions in name order.
	pub fn regions(&self) -> impl Iterator<Item = &Region> {
		self.index.values().map(|n| &self.graph[*n])
	}

	pub fn region_for_bundle(&self, bundle_id: u64) -> Option<&Region> {
		self.regions().find(|r| r.contains_bundle(bundle_id))
	}

	fn node(&self, name: &str) -> crate::Result<NodeIndex> {
		self.index.get(name).copied().ok_or_else(|| crate::Error::Configuration(format!("unknown region {}", name)))
	}

	/// Makes capabilities of `head` allowed by `filter` visible from `tail`.
	pub fn connect(&mut self, tail: &str, filter: RegionFilter, head: &str) -> crate::Result<()> {
		let (t, h) = (self.node(tail)?, self.node(head)?);
		if t == h {
			return Err(crate::Error::Configuration(format!("cannot connect region {} to itself", tail)));
		}
		if self.graph.find_edge(t, h).is_some() {
			return Err(crate::Error::AlreadyExists(format!("edge {} -> {}", tail, head)));
		}
		self.graph.add_edge(t, h, filter);
		Ok(())
	}

	/// Outgoing edges of `tail` as `(head, filter)`.
	pub fn edges(&self, tail: &str) -> Vec<(&str, &RegionFilter)> {
		match self.index.get(tail) {
			Some(t) => self.graph.edges(*t).map(|e| (self.graph[e.target()].name(), e.weight())).collect(),
			None => vec![],
		}
	}

	/// Every edge as `(tail, head, filter)`.
	pub fn all_edges(&self) -> impl Iterator<Item = (&str, &str, &RegionFilter)> {
		self.graph.edge_references().map(|e| (self.graph[e.source()].name(), self.graph[e.target()].name(), e.weight()))
	}

	/// Candidates visible from `start`.
	///
	/// A candidate is visible when it lives in a region (`in_region`) reachable from `start` through edges
	/// whose filters all allow it (`allowed`). Candidates in `start` itself are always visible.
	pub fn visible<T: Copy + Ord>(
		&self,
		start: &str,
		candidates: &[T],
		in_region: impl Fn(&Region, T) -> bool,
		allowed: impl Fn(&RegionFilter, T) -> bool,
	) -> BTreeSet<T> {
		let Some(&start) = self.index.get(start) else { return BTreeSet::new() };

		/* Candidates that made it to each region, filters only ever narrow so this reaches a fixed point */
		let mut reached: HashMap<NodeIndex, BTreeSet<usize>> = HashMap::new();
		reached.insert(start, (0..candidates.len()).collect());
		let mut queue = VecDeque::from([start]);

		while let Some(node) = queue.pop_front() {
			let current = reached.get(&node).cloned().unwrap_or_default();
			for edge in self.graph.edges(node) {
				let passed: Vec<usize> = current.iter()
					.copied()
					.filter(|i| allowed(edge.weight(), candidates[*i]))
					.collect();
				let entry = reached.entry(edge.target()).or_default();
				let before = entry.len();
				entry.extend(passed);
				if entry.len() > before {
					queue.push_back(edge.target());
				}
			}
		}

		let mut visible = BTreeSet::new();
		for (node, indices) in &reached {
			let region = &self.graph[*node];
			for i in indices {
				if in_region(region, candidates[*i]) {
					visible.insert(candidates[*i]);
				}
			}
		}
		log::trace!("{} of {} candidates visible from {}", visible.len(), candidates.len(), self.graph[start].name());
		visible
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::filter::ALL_FILTER;
	use crate::resource::Attributes;

	fn share_all() -> RegionFilter {
		let mut policy = SharingPolicy::new();
		policy.entry(VISIBLE_ALL_NAMESPACE.to_string()).or_default().insert(ALL_FILTER.to_string());
		RegionFilter::new(policy).unwrap()
	}

	fn share_none() -> RegionFilter {
		RegionFilter::new(SharingPolicy::new()).unwrap()
	}

	fn digraph() -> RegionDigraph {
		let mut d = RegionDigraph::new();
		for name in ["root", "root/a", "root/b"] {
			d.create_region(name).unwrap();
		}
		d
	}

	#[test]
	fn duplicate_region() { assert!(digraph().create_region("root").is_err()); }

	#[test]
	fn self_edge_rejected() { assert!(digraph().connect("root", share_all(), "root").is_err()); }

	#[test]
	fn duplicate_edge_rejected() {
		let mut d = digraph();
		d.connect("root/a", share_all(), "root").unwrap();
		assert!(d.connect("root/a", share_all(), "root").is_err());
	}

	#[test]
	fn start_region_always_visible() {
		let d = digraph();
		let visible = d.visible("root/a", &[0usize, 1], |r, c| (c == 0) == (r.name() == "root/a"), |_, _| false);
		assert_eq!(visible, BTreeSet::from([0]));
	}

	#[test]
	fn filtered_edge_hides() {
		let mut d = digraph();
		d.connect("root/a", share_none(), "root").unwrap();
		let visible = d.visible("root/a", &[0usize], |r, _| r.name() == "root", |f, _| f.is_allowed("osgi.wiring.package", &Attributes::default()));
		assert!(visible.is_empty());
	}

	#[test]
	fn transitive_visibility() {
		let mut d = digraph();
		d.connect("root/a", share_all(), "root").unwrap();
		d.connect("root", share_all(), "root/b").unwrap();
		let visible = d.visible("root/a", &[7usize], |r, _| r.name() == "root/b", |f, _| f.is_allowed("osgi.wiring.package", &Attributes::default()));
		assert_eq!(visible, BTreeSet::from([7]));
	}

	#[test]
	fn cycles_terminate() {
		let mut d = digraph();
		d.connect("root/a", share_all(), "root").unwrap();
		d.connect("root", share_all(), "root/a").unwrap();
		assert!(d.visible("root", &[1usize], |_, _| true, |_, _| true).contains(&1));
	}

	#[test]
	fn all_edges_lists_tail_and_head() {
		let mut d = digraph();
		d.connect("root/a", share_all(), "root").unwrap();
		d.connect("root", share_none(), "root/b").unwrap();
		let mut edges: Vec<(&str, &str)> = d.all_edges().map(|(t, h, _)| (t, h)).collect();
		edges.sort();
		assert_eq!(edges, vec![("root", "root/b"), ("root/a", "root")]);
	}

	#[test]
	fn bundle_lookup() {
		let mut d = digraph();
		d.region_mut("root/b").unwrap().add_bundle(12);
		assert_eq!(d.region_for_bundle(12).map(Region::name), Some("root/b"));
	}
}
