//! dockspec - Dockerfiles from inheritable build specifications
//!
//! A specification is a plain text file (`<name>.docker_spec`) listing
//! dependencies under flags: a base image, OS packages, conda and pip packages,
//! version pins, python modules to copy in. A specification may name parents
//! with `PARENT`; the whole chain is merged into one dependency collection, and
//! that collection is emitted as Dockerfile instructions in a fixed order.
//!
//! ```text
//! # scientific.docker_spec
//! PARENT ubuntu_conda
//! APT build-essential
//! CONDA numpy>=1.24;conda-forge scipy
//! PIP tqdm git+https://github.com/org/tool.git@main
//! ```
//!
//! # Pipeline
//!
//! 1. [`locator`] finds specification files on the search path
//! 2. [`parser`] reads one file into flagged token lists
//! 3. [`resolver`] walks the `PARENT` chain breadth-first and merges every
//!    file into a [`dependency::DependencyCollection`]
//! 4. [`staging`] optionally clones remote pip sources on the host
//! 5. [`emitter`] writes the Dockerfile instructions
//! 6. [`build`] writes the build context and drives the container engine
//!
//! The resolver and emitter are synchronous and free of I/O beyond reading
//! specification files. Container and git access sit behind the
//! [`dependency::EnvironmentExporter`] and [`staging::SourceFetcher`] traits.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface
//! - [`config`] - User configuration (`~/.dockspec/config.toml`)
//! - [`constants`] - File names, in-image paths, fixed snippets
//! - [`container`] - Container engine and host python collaborators
//! - [`core`] - Error types and user-facing error display
//! - [`git`] - Shallow clones for staging
//! - [`utils`] - Filesystem, platform and process helpers

pub mod build;
pub mod cli;
pub mod config;
pub mod constants;
pub mod container;
pub mod core;
pub mod dependency;
pub mod emitter;
pub mod git;
pub mod locator;
pub mod parser;
pub mod resolver;
pub mod staging;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
