use dockspec::core::DockspecError;
use dockspec::emitter::{EmitContext, emit};
use dockspec::resolver::Resolver;
use dockspec::test_utils::{SpecDir, init_test_logging};

fn spec_chain() -> SpecDir {
    init_test_logging(None);
    let specs = SpecDir::new().unwrap();
    specs
        .write(
            "os",
            "# Base layer\nFROM ubuntu:22.04\nAPT curl wget\nPYTHONV 3.10\n",
        )
        .unwrap();
    specs.write("tools", "PARENT os\nAPT git\nCONDA numpy>=1.20;conda-forge\n").unwrap();
    specs
        .write(
            "analysis",
            "PARENT tools\nPYTHONV 3.11\nCONDA numpy<2 pandas;conda-forge\nPIP tqdm requests;--no-cache-dir\nPIPLAST jupyter\n",
        )
        .unwrap();
    specs
}

#[test]
fn test_chain_merges_into_one_dockerfile() {
    let specs = spec_chain();
    let locator = specs.locator();
    let resolution = Resolver::new(&locator).resolve("analysis").unwrap();
    assert_eq!(resolution.chain, vec!["analysis", "tools", "os"]);

    let output = emit(&resolution.collection, &EmitContext::default()).unwrap();
    let lines = &output.lines;

    assert_eq!(lines[0], "FROM ubuntu:22.04");
    // Breadth-first: the closest specification contributes first
    assert_eq!(lines[1], "RUN apt-get update \\\n    && apt-get install -y git curl wget");
    assert!(lines.contains(&"RUN conda install -y python=3.11".to_string()));

    let conda = lines.iter().find(|l| l.contains("conda install -y -c conda-forge")).unwrap();
    assert!(conda.contains("'numpy<2,>=1.20'"), "{conda}");
    assert!(conda.contains("pandas"));
    assert_eq!(conda.matches("tos accept").count(), 1);

    let pip_index = lines.iter().position(|l| l.contains("pip install tqdm")).unwrap();
    assert!(lines[pip_index].contains("pip install requests --no-cache-dir"));
    assert_eq!(lines.last().unwrap(), "RUN pip install jupyter");
    assert!(!output.contains_private);
    assert!(output.staging_dir.is_none());
}

#[test]
fn test_missing_parent_is_reported_with_chain() {
    let specs = SpecDir::new().unwrap();
    specs.write("child", "PARENT ghost\nFROM ubuntu:22.04\n").unwrap();

    let err = Resolver::new(&specs.locator()).resolve("child").unwrap_err();
    let found = err
        .chain()
        .find_map(|e| e.downcast_ref::<DockspecError>())
        .cloned()
        .unwrap();
    match found {
        DockspecError::SpecNotFound {
            name,
            ..
        } => assert_eq!(name, "ghost.docker_spec"),
        other => panic!("Expected SpecNotFound, got {other:?}"),
    }
}

#[test]
fn test_preinstalled_image_skips_bootstrap() {
    let specs = SpecDir::new().unwrap();
    specs.write("env", "FROM continuumio/miniconda3:latest\nPIP tqdm\n").unwrap();
    specs.write_file("containers_wconda.txt", "continuumio/miniconda3:latest\n").unwrap();

    let locator = specs.locator();
    let resolution = Resolver::new(&locator).resolve("env").unwrap();
    let ctx = EmitContext {
        preinstalled_images: locator.preinstalled_images().unwrap(),
        ..Default::default()
    };
    let output = emit(&resolution.collection, &ctx).unwrap();

    assert!(!output.lines.iter().any(|l| l.starts_with("ADD ")));
    assert!(output.lines.contains(&"RUN conda update -y -n base conda".to_string()));
    assert_eq!(output.lines.last().unwrap(), "RUN pip install tqdm");
}
