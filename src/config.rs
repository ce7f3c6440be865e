use clap::Parser;
use std::path::PathBuf;

use crate::constants;

#[derive(Parser, Debug, Clone)]
#[command(name = "snapshelf")]
#[command(version)]
#[command(about = "🖼️ A minimal self-hosted image host with password-protected uploads")]
#[command(long_about = "\
Snapshelf - A Minimal Self-Hosted Image Host

Serves every image in a single directory over HTTP, with a gallery page
for uploading and deleting images behind one shared password.

EXAMPLES:
    # Serve ./images on the default port
    SNAPSHELF_PASSWORD=secret snapshelf

    # Custom directory and port, with a self-signed certificate
    snapshelf --image-dir /var/images \\
        --password secret \\
        --port 8443 \\
        --self-signed-certs-on-the-fly

    # Using environment variables
    export SNAPSHELF_IMAGE_DIR=/path/to/images
    export SNAPSHELF_PASSWORD=secret
    snapshelf
")]
pub struct Config {
    /// Directory holding the served images
    ///
    /// Created on startup if it does not exist. Only its top level is used.
    #[arg(
        long,
        default_value = "images",
        env = "SNAPSHELF_IMAGE_DIR",
        value_name = "DIR"
    )]
    pub image_dir: PathBuf,

    /// Shared password for uploading and deleting images
    ///
    /// The password is also the session cookie value, so it must be a legal
    /// cookie value. The default is a well-known placeholder; always set one.
    #[arg(
        long,
        default_value = constants::DEFAULT_PASSWORD,
        env = "SNAPSHELF_PASSWORD",
        value_name = "PASSWORD",
        hide_default_value = true
    )]
    pub password: String,

    /// Host/IP address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "SNAPSHELF_HOST", value_name = "HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(
        long,
        default_value_t = constants::DEFAULT_PORT,
        env = "SNAPSHELF_PORT",
        value_name = "PORT"
    )]
    pub port: u16,

    /// Largest accepted upload, in bytes
    #[arg(
        long,
        default_value_t = constants::DEFAULT_MAX_UPLOAD_BYTES,
        env = "SNAPSHELF_MAX_UPLOAD_BYTES",
        value_name = "BYTES"
    )]
    pub max_upload_bytes: usize,

    /// Path to TLS certificate file (PEM format)
    ///
    /// Serves HTTPS when given together with --key. Plain HTTP otherwise.
    #[arg(long, env = "SNAPSHELF_CERT", value_name = "CERT_PATH")]
    pub cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long, env = "SNAPSHELF_KEY", value_name = "KEY_PATH")]
    pub key: Option<PathBuf>,

    /// Generate self-signed certificates on-the-fly
    ///
    /// WARNING: For development only! Self-signed certificates will trigger
    /// browser warnings.
    #[arg(long, env = "SNAPSHELF_SELF_SIGNED")]
    pub self_signed_certs_on_the_fly: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.self_signed_certs_on_the_fly {
            if self.cert.is_some() || self.key.is_some() {
                tracing::warn!(
                    "--self-signed-certs-on-the-fly is set, ignoring --cert and --key arguments"
                );
            }
        } else {
            match (&self.cert, &self.key) {
                (Some(cert), Some(key)) => {
                    if !cert.exists() {
                        anyhow::bail!("Certificate file does not exist: {:?}", cert);
                    }
                    if !key.exists() {
                        anyhow::bail!("Private key file does not exist: {:?}", key);
                    }
                }
                (None, None) => {}
                _ => anyhow::bail!("--cert and --key must be given together"),
            }
        }

        if self.password.is_empty() {
            anyhow::bail!("Password cannot be empty");
        }

        if !is_cookie_value(&self.password) {
            anyhow::bail!(
                "Password may only contain printable ASCII without spaces, quotes, commas, semicolons or backslashes"
            );
        }

        if self.password == constants::DEFAULT_PASSWORD {
            tracing::warn!(
                "Using the default password {:?} - set SNAPSHELF_PASSWORD before exposing this server",
                constants::DEFAULT_PASSWORD
            );
        }

        if self.max_upload_bytes == 0 {
            anyhow::bail!("Maximum upload size must be greater than zero");
        }

        if !self.image_dir.exists() {
            std::fs::create_dir_all(&self.image_dir).map_err(|err| {
                anyhow::anyhow!("Failed to create image directory {:?}: {}", self.image_dir, err)
            })?;
            tracing::info!("Created image directory {:?}", self.image_dir);
        }

        if !self.image_dir.is_dir() {
            anyhow::bail!("Image path is not a directory: {:?}", self.image_dir);
        }

        Ok(())
    }
}

/// RFC 6265 cookie-octet: the password is sent verbatim as the cookie value
fn is_cookie_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E))
}
