//! JSON persistence of a digraph.
//!
//! ```json
//! { "regions": { "root": [0, 12] },
//!   "edges": [ { "tail": "root/app", "head": "root", "policy": { "osgi.identity": ["(type=subsystem)"] } } ] }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Deserialize};

use super::{RegionDigraph, RegionFilter, SharingPolicy};

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Snapshot {
	regions: BTreeMap<String, BTreeSet<u64>>,
	#[serde(default)]
	edges: Vec<EdgeSnapshot>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct EdgeSnapshot {
	tail: String,
	head: String,
	policy: SharingPolicy,
}

impl RegionDigraph {
	fn snapshot(&self) -> Snapshot {
		let mut edges: Vec<EdgeSnapshot> = self.all_edges()
			.map(|(tail, head, filter)| EdgeSnapshot { tail: tail.to_string(), head: head.to_string(), policy: filter.policy().clone() })
			.collect();
		edges.sort_by(|a, b| (&a.tail, &a.head).cmp(&(&b.tail, &b.head)));

		Snapshot {
			regions: self.regions().map(|r| (r.name().to_string(), r.bundle_ids().clone())).collect(),
			edges,
		}
	}

	fn from_snapshot(snapshot: Snapshot) -> crate::Result<Self> {
		let mut digraph = RegionDigraph::new();
		for (name, ids) in snapshot.regions {
			digraph.create_region(name.clone())?;
			if let Some(region) = digraph.region_mut(&name) {
				for id in ids {
					region.add_bundle(id);
				}
			}
		}
		for edge in snapshot.edges {
			digraph.connect(&edge.tail, RegionFilter::new(edge.policy)?, &edge.head)?;
		}
		Ok(digraph)
	}

	pub fn to_json(&self) -> crate::Result<String> {
		Ok(serde_json::to_string_pretty(&self.snapshot())?)
	}

	pub fn from_json(text: &str) -> crate::Result<Self> {
		Self::from_snapshot(serde_json::from_str(text)?)
	}

	pub fn save(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let file = std::fs::File::create(path)?;
		serde_json::to_writer_pretty(file, &self.snapshot())?;
		Ok(())
	}

	pub fn load(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		Self::from_snapshot(serde_json::from_reader(std::io::BufReader::new(file))?)
	}

	/// Best effort [`RegionDigraph::save`], failures are only logged.
	pub fn save_snapshot(&self, path: impl AsRef<std::path::Path>) {
		let path = path.as_ref();
		match self.save(path) {
			Ok(()) => log::debug!("Saved region digraph to {}", path.display()),
			Err(e) => log::warn!("Failed to save region digraph to {}: {}", path.display(), e),
		}
	}

	/// Same regions, bundle ids and edge policies.
	pub fn same_as(&self, other: &RegionDigraph) -> bool {
		self.snapshot() == other.snapshot()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::filter::ALL_FILTER;
	use crate::region_digraph::VISIBLE_ALL_NAMESPACE;

	fn filter(namespace: &str, filter: &str) -> RegionFilter {
		let mut policy = SharingPolicy::new();
		policy.entry(namespace.to_string()).or_default().insert(filter.to_string());
		RegionFilter::new(policy).unwrap()
	}

	fn sample() -> RegionDigraph {
		let mut d = RegionDigraph::new();
		d.create_region("root").unwrap();
		d.create_region("root/app").unwrap();
		d.region_mut("root").unwrap().add_bundle(0);
		d.region_mut("root/app").unwrap().add_bundle(12);
		d.connect("root/app", filter(VISIBLE_ALL_NAMESPACE, ALL_FILTER), "root").unwrap();
		d.connect("root", filter("osgi.identity", "(type=subsystem)"), "root/app").unwrap();
		d
	}

	#[test]
	fn json_round_trip() {
		let d = sample();
		let loaded = RegionDigraph::from_json(&d.to_json().unwrap()).unwrap();
		assert!(d.same_as(&loaded));
		assert!(loaded.region("root/app").unwrap().contains_bundle(12));
	}

	#[test]
	fn reads_documented_format() {
		let text = r#"{"regions": {"root": [0], "root/app": []}, "edges": [{"tail": "root/app", "head": "root", "policy": {"osgi.identity": ["(type=subsystem)"]}}]}"#;
		let d = RegionDigraph::from_json(text).unwrap();
		assert_eq!(d.edges("root/app").len(), 1);
	}

	#[test]
	fn edge_to_unknown_region() {
		let text = r#"{"regions": {"root": []}, "edges": [{"tail": "root", "head": "nowhere", "policy": {}}]}"#;
		assert!(RegionDigraph::from_json(text).is_err());
	}

	#[test]
	fn unwritable_snapshot_is_swallowed() { sample().save_snapshot("/proc/definitely/not/writable.json"); }
}
