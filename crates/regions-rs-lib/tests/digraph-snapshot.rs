use regions_rs::resolver::SimpleResolver;
use regions_rs::subsystem_resolver::SubsystemResolverBuilder;
use regions_rs::RegionDigraph;
use regions_rs_test_utils as utils;

#[test]
fn snapshot_matches_resolved_digraph() {
	let _ = env_logger::builder().is_test(true).try_init();
	let dir = tempfile::tempdir().unwrap();
	let snapshot = dir.path().join("digraph.json");

	let f1 = utils::feature("f1", "1.0.0", &[utils::location("b1", "1.0.0")]);
	let (_repository_dir, repository_path) = utils::write_repository(&utils::repository("test:features", vec![f1])).unwrap();
	let repository = regions_rs::feature::FeatureRepository::load_from_path(repository_path).unwrap();

	let resolved = SubsystemResolverBuilder::new()
		.add_repositories([repository])
		.add_requirements("root/app", ["f1"])
		.digraph_snapshot(Some(snapshot.clone()))
		.build()
		.unwrap()
		.resolve(&SimpleResolver, &utils::downloads([utils::manifest("b1", "1.0.0", &[])]))
		.unwrap();

	let saved = RegionDigraph::load(&snapshot).unwrap();
	assert!(saved.same_as(resolved.digraph()));
	assert!(saved.region("root/app#f1-1.0.0").is_some());

	let flat = resolved.flat_digraph().unwrap();
	assert!(flat.region("root/app#f1-1.0.0").is_none());
	assert_eq!(flat.edges("root/app").len(), 1);
}
