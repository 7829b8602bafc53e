//! Crate-wide constants.

pub const APP_NAME: &str = "trellis";

/// Name of the workspace that holds the engine's own rule and provider definitions.
pub const BUILTIN_WORKSPACE: &str = "trellis.builtin";

/// Default directory under which named workspaces are mounted.
pub const DEFAULT_WORKSPACES_ROOT: &str = "/workspaces";

/// Default installation path of the builtin workspace.
pub const DEFAULT_BUILTIN_ROOT: &str = "/opt/trellis/builtin";

/// Environment variable overriding [`DEFAULT_WORKSPACES_ROOT`].
pub const WORKSPACES_ROOT_ENV: &str = "TRELLIS_WORKSPACES_ROOT";

/// Environment variable overriding [`DEFAULT_BUILTIN_ROOT`].
pub const BUILTIN_ROOT_ENV: &str = "TRELLIS_BUILTIN_ROOT";

/// Environment variable holding the `tracing` filter directive.
pub const LOG_ENV: &str = "TRELLIS_LOG";

// Wire sentinels. Each polymorphic value crosses the host boundary as an
// object carrying exactly one of these keys.
pub const LABEL_SENTINEL: &str = "$trellis_label";
pub const LABEL_PATH_SENTINEL: &str = "$trellis_label_path";
pub const PROVIDER_SENTINEL: &str = "$trellis_provider";
pub const OPTION_SENTINEL: &str = "$trellis_option";
pub const SELECTION_SENTINEL: &str = "$trellis_selection";
pub const GLOBSET_SENTINEL: &str = "$trellis_globset";
pub const ACTION_SENTINEL: &str = "$trellis_action";
pub const TEMPLATED_ARGUMENT_SENTINEL: &str = "$trellis_argument_templated";
pub const RESPFILE_ARGUMENT_SENTINEL: &str = "$trellis_argument_respfile";
