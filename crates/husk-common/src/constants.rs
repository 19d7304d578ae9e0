//! System-wide constants and defaults.

/// Application name used in log output and staging directory prefixes.
pub const APP_NAME: &str = "husk";

/// Prefix of every staging root created under the temp directory.
pub const STAGING_PREFIX: &str = "husk-root-";

/// Tag applied to image references that do not carry one.
pub const DEFAULT_TAG: &str = "latest";

/// Default registry API endpoint (Docker Hub).
pub const DEFAULT_REGISTRY_URL: &str = "https://registry-1.docker.io";

/// Default bearer-token issuing endpoint (Docker Hub).
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";

/// `service` parameter sent to the token endpoint.
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";

/// Namespace Docker Hub uses for single-segment official image names.
pub const OFFICIAL_IMAGE_NAMESPACE: &str = "library";

/// Manifest media types requested from the registry, most preferred first.
pub const MANIFEST_MEDIA_TYPES: &[&str] = &[
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.oci.image.manifest.v1+json",
];

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Maximum number of layers accepted in an image manifest.
pub const MAX_IMAGE_LAYERS: usize = 128;

/// Host tool listing a binary's shared-library dependencies.
pub const DEFAULT_LDD_PROGRAM: &str = "ldd";

/// Host tool creating the namespaces.
pub const DEFAULT_UNSHARE_PROGRAM: &str = "unshare";

/// Host tool re-rooting the child.
pub const DEFAULT_CHROOT_PROGRAM: &str = "chroot";

/// Process exit code for unexpected failures.
pub const EXIT_FAILURE: u8 = 1;

/// Process exit code when a required executable is missing.
pub const EXIT_SETUP_NOT_FOUND: u8 = 2;

/// Offset added to a signal number when a child dies from a signal.
pub const SIGNAL_EXIT_BASE: i32 = 128;
