use std::collections::BTreeMap;

use super::{ResolutionError, ResolveContext, Resolver, Wire, Wiring};
use crate::resource::{CapabilityRef, Namespace, RequirementRef, ResourceId};

/// Depth first resolver trying candidates in the order the context gives them.
///
/// Providers that are already resolved are preferred. A failed candidate is rolled back and the next one tried,
/// there is no backtracking across requirements. Fragments only wire their host requirement themselves,
/// their other requirements are wired on behalf of the host once attached. Fragment capabilities become
/// available once their fragment is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleResolver;

#[derive(Debug, Clone, Default)]
struct State {
	wiring: Wiring,
	/// fragment -> host
	hosts: BTreeMap<ResourceId, ResourceId>,
}

impl SimpleResolver {
	pub fn new() -> Self { Self }

	/// Replaces capabilities of fragments by hosted ones, dropping those of unattached fragments.
	fn host_candidates(&self, context: &dyn ResolveContext, candidates: Vec<CapabilityRef>, state: &State) -> (Vec<CapabilityRef>, BTreeMap<CapabilityRef, ResourceId>) {
		let store = context.resources();
		let (fragment, mut plain): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| {
			store.get(c.resource).is_fragment() && store.capability(*c).namespace() != &Namespace::Identity
		});

		let mut hosted = BTreeMap::new();
		for cap in fragment {
			if let Some(host) = state.hosts.get(&cap.resource) {
				context.insert_hosted_capability(&mut plain, cap);
				hosted.insert(cap, *host);
			}
		}
		(plain, hosted)
	}

	fn resolve_resource(&self, context: &dyn ResolveContext, id: ResourceId, state: &mut State) -> Result<(), ResolutionError> {
		if state.wiring.contains_key(&id) {
			return Ok(());
		}
		state.wiring.insert(id, Vec::new());

		let store = context.resources();
		let fragment = store.get(id).is_fragment();
		let mut requirements: Vec<RequirementRef> = store.requirement_refs(id).collect();
		if fragment {
			/* Host first so the remaining requirements know who they are wired for */
			requirements.sort_by_key(|r| store.requirement(*r).namespace() != &Namespace::Host);
		}

		for req_ref in requirements {
			let requirement = store.requirement(req_ref);
			if requirement.is_dynamic() || !context.is_effective(req_ref) {
				continue;
			}

			let requirer = if fragment {
				match requirement.namespace() {
					Namespace::Host => id,
					Namespace::Identity => continue,
					_ => match state.hosts.get(&id) {
						Some(host) => *host,
						None => continue,
					},
				}
			} else {
				id
			};

			let (mut candidates, hosted) = self.host_candidates(context, context.find_providers(req_ref)?, state);
			let provider_of = |c: &CapabilityRef| hosted.get(c).copied().unwrap_or(c.resource);
			if !requirement.is_optional() {
				/* Stable, keeps the context ordering within each group */
				candidates.sort_by_key(|c| !state.wiring.contains_key(&provider_of(c)));
			}

			let mut failure = None;
			let mut wired = false;
			for capability in candidates {
				let provider = provider_of(&capability);
				let mut trial = state.clone();
				match self.resolve_resource(context, provider, &mut trial) {
					Ok(()) => {
						*state = trial;
						if requirement.namespace() == &Namespace::Host && fragment {
							state.hosts.insert(id, provider);
						}
						state.wiring.entry(requirer).or_default().push(Wire { requirement: req_ref, capability, requirer, provider });
						wired = true;
						break;
					},
					Err(e) => {
						log::trace!("Candidate {} for {} failed: {}", store.get(provider), requirement, e);
						failure.get_or_insert(e);
					},
				}
			}

			if !wired && !requirement.is_optional() {
				return Err(failure.unwrap_or_else(|| ResolutionError::Unsatisfied {
					resource: store.get(id).to_string(),
					requirement: requirement.to_string(),
				}));
			}
		}
		Ok(())
	}
}

impl Resolver for SimpleResolver {
	fn resolve(&self, context: &dyn ResolveContext) -> Result<Wiring, ResolutionError> {
		let mut state = State { wiring: context.wirings(), ..Default::default() };

		for id in context.mandatory_resources() {
			self.resolve_resource(context, id, &mut state)?;
		}
		for id in context.optional_resources() {
			let mut trial = state.clone();
			match self.resolve_resource(context, id, &mut trial) {
				Ok(()) => state = trial,
				Err(e) => log::debug!("Optional resource {} not resolved: {}", context.resources().get(id), e),
			}
		}

		log::debug!("Resolved {} resources", state.wiring.len());
		Ok(state.wiring)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::resource::builder::{self, Headers};
	use crate::resource::{Resource, ResourceOrigin, ResourceStore};

	/// Every resource sees every other, candidates in store order.
	struct FlatContext {
		store: ResourceStore,
		root: ResourceId,
	}

	impl ResolveContext for FlatContext {
		fn resources(&self) -> &ResourceStore { &self.store }
		fn mandatory_resources(&self) -> Vec<ResourceId> { vec![self.root] }
		fn find_providers(&self, requirement: RequirementRef) -> Result<Vec<CapabilityRef>, ResolutionError> {
			let req = self.store.requirement(requirement);
			Ok(self.store.iter()
				.flat_map(|(id, _)| self.store.capability_refs(id))
				.filter(|c| req.matches(self.store.capability(*c)))
				.collect())
		}
		fn insert_hosted_capability(&self, capabilities: &mut Vec<CapabilityRef>, hosted: CapabilityRef) -> usize {
			capabilities.push(hosted);
			capabilities.len() - 1
		}
		fn is_effective(&self, _: RequirementRef) -> bool { true }
	}

	fn bundle(store: &mut ResourceStore, pairs: &[(&str, &str)]) -> ResourceId {
		let headers: Headers = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		store.add(builder::build_resource(ResourceOrigin::Bundle { uri: "test".into() }, &headers).unwrap())
	}

	fn root_requiring(store: &mut ResourceStore, clause: &str) -> ResourceId {
		let mut root = Resource::new(ResourceOrigin::Synthetic);
		for req in builder::parse_requirements(clause).unwrap() {
			root.add_requirement(req);
		}
		store.add(root)
	}

	#[test]
	fn wires_package_import() {
		let mut store = ResourceStore::default();
		let exporter = bundle(&mut store, &[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]);
		let importer = bundle(&mut store, &[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]);
		let root = root_requiring(&mut store, "osgi.identity;filter:=\"(osgi.identity=b2)\"");

		let wiring = SimpleResolver.resolve(&FlatContext { store, root }).unwrap();
		assert_eq!(wiring[&importer][0].provider, exporter);
		assert!(wiring.contains_key(&exporter));
	}

	#[test]
	fn missing_mandatory_fails() {
		let mut store = ResourceStore::default();
		bundle(&mut store, &[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]);
		let root = root_requiring(&mut store, "osgi.identity;filter:=\"(osgi.identity=b2)\"");
		assert!(matches!(SimpleResolver.resolve(&FlatContext { store, root }), Err(ResolutionError::Unsatisfied { .. })));
	}

	#[test]
	fn missing_optional_is_skipped() {
		let mut store = ResourceStore::default();
		let b2 = bundle(&mut store, &[("Bundle-SymbolicName", "b2"), ("Import-Package", "p;resolution:=optional")]);
		let root = root_requiring(&mut store, "osgi.identity;filter:=\"(osgi.identity=b2)\"");
		let wiring = SimpleResolver.resolve(&FlatContext { store, root }).unwrap();
		assert!(wiring[&b2].is_empty());
	}

	#[test]
	fn falls_back_to_next_candidate() {
		let mut store = ResourceStore::default();
		/* First exporter cannot resolve itself */
		bundle(&mut store, &[("Bundle-SymbolicName", "broken"), ("Export-Package", "p"), ("Import-Package", "missing")]);
		let good = bundle(&mut store, &[("Bundle-SymbolicName", "good"), ("Export-Package", "p")]);
		let importer = bundle(&mut store, &[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]);
		let root = root_requiring(&mut store, "osgi.identity;filter:=\"(osgi.identity=b2)\"");

		let wiring = SimpleResolver.resolve(&FlatContext { store, root }).unwrap();
		assert_eq!(wiring[&importer][0].provider, good);
	}

	#[test]
	fn fragment_wires_host_only() {
		let mut store = ResourceStore::default();
		let host = bundle(&mut store, &[("Bundle-SymbolicName", "host")]);
		let fragment = bundle(&mut store, &[("Bundle-SymbolicName", "frag"), ("Fragment-Host", "host")]);
		let root = root_requiring(&mut store, "osgi.identity;filter:=\"(osgi.identity=frag)\"");

		let wiring = SimpleResolver.resolve(&FlatContext { store, root }).unwrap();
		assert_eq!(wiring[&fragment].len(), 1);
		assert_eq!(wiring[&fragment][0].provider, host);
	}

	#[test]
	fn cycles_resolve() {
		let mut store = ResourceStore::default();
		let a = bundle(&mut store, &[("Bundle-SymbolicName", "a"), ("Export-Package", "pa"), ("Import-Package", "pb")]);
		let b = bundle(&mut store, &[("Bundle-SymbolicName", "b"), ("Export-Package", "pb"), ("Import-Package", "pa")]);
		let root = root_requiring(&mut store, "osgi.identity;filter:=\"(osgi.identity=a)\"");

		let wiring = SimpleResolver.resolve(&FlatContext { store, root }).unwrap();
		assert_eq!(wiring[&a][0].provider, b);
		assert_eq!(wiring[&b][0].provider, a);
	}
}
