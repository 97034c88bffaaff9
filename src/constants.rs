//! Global constants used throughout the dockspec codebase.
//!
//! File names, search-path variables, in-image locations and the fixed shell
//! snippets the emitter writes. Flag keywords live on [`crate::dependency::Flag`].

use std::time::Duration;

/// Reserved flag introducing parent specification references.
pub const PARENT_FLAG: &str = "PARENT";

/// Separator between the fields of a single `CONDA` or `PIP` token.
pub const FIELD_SEPARATOR: char = ';';

/// Marker starting a comment, either as a whole line or inline.
pub const COMMENT_MARKER: char = '#';

/// Suffix of specification files on disk.
pub const SPEC_FILE_SUFFIX: &str = ".docker_spec";

/// Environment variable holding a colon-delimited list of extra specification directories.
pub const SPEC_DIRS_ENV: &str = "DOCKSPEC_SPECS";

/// Aggregation file listing base images that already ship conda.
pub const PREINSTALLED_IMAGES_FILE: &str = "containers_wconda.txt";

/// File holding instructions inserted right after the `FROM` line.
pub const BASE_COMMANDS_FILE: &str = "base_dockerfile_commands.txt";

/// Directory bundled with the crate that holds the default specifications.
pub fn bundled_spec_dir() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("specifications")
}

/// Default name of the staging directory created under the working directory.
pub const DEFAULT_STAGING_DIR: &str = "dockspec_staging";

/// Name of the generated build file.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Login shell directive so that conda's profile hooks are active in `RUN` steps.
pub const LOGIN_SHELL_DIRECTIVE: &str = r#"SHELL ["/bin/bash", "--login", "-c"]"#;

/// Miniconda installer fetched when the base image has no conda.
pub const CONDA_INSTALLER_URL: &str =
    "https://repo.anaconda.com/miniconda/Miniconda3-latest-Linux-x86_64.sh";

/// In-image directory receiving installers and environment files.
pub const INTERNAL_INSTALLATION_DIR: &str = "/installation_files";

/// In-image conda prefix.
pub const INTERNAL_CONDA_DIR: &str = "/opt/conda";

/// In-image directory receiving helper scripts.
pub const INTERNAL_SCRIPT_DIR: &str = "/misc_scripts";

/// In-image directory receiving staged remote sources.
pub const INTERNAL_STAGED_SOURCES_DIR: &str = "/staged_sources";

/// In-image directory receiving `PYTHONPATH` modules.
pub const INTERNAL_EXTRA_MODULES_DIR: &str = "/extra_modules";

/// Name of the environment file written from a `YML` export.
pub const ENV_EXPORT_FILE: &str = "base.yml";

/// Name of the private-install helper script.
pub const PRIVATE_INSTALL_SCRIPT: &str = "private_pip_install.py";

/// Contents of the private-install helper script.
pub const PRIVATE_INSTALL_SCRIPT_SOURCE: &str = include_str!("../assets/private_pip_install.py");

/// Channels accepted for packages that do not name a conda channel.
pub const DEFAULT_CONDA_CHANNELS: [&str; 2] =
    ["https://repo.anaconda.com/pkgs/main", "https://repo.anaconda.com/pkgs/r"];

/// Host answered by the private-install helper when `PRIVATE_GIT` names none.
pub const DEFAULT_PRIVATE_HOST: &str = "github.com";

/// Continuation joining the commands of one `RUN` instruction.
pub const RUN_CONTINUATION: &str = " \\\n    && ";

/// Timeout applied to git clones during staging.
pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Secure removal binary on Linux.
pub const LINUX_SAFE_REMOVAL: &str = "wipe";

/// Secure removal binary on macOS.
pub const MACOS_SAFE_REMOVAL: &str = "gwipe";

/// Environment variable holding the login for private sources.
pub const GIT_LOGIN_ENV: &str = "DOCKSPEC_GIT_LOGIN";

/// Environment variable holding the password for private sources.
pub const GIT_PASSWORD_ENV: &str = "DOCKSPEC_GIT_PASSWORD";
