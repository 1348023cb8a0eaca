//! Container image layers as URLs
//!
//! `docker:<host>/<repository>:<tag>` pulls the image, streams it as a
//! tarball of its layers through a pipe, and exposes the decompressed
//! content of the first `.tar.gz` layer. The pull runs on its own thread so
//! the caller can start reading while layers are still being written.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;

use flate2::read::MultiGzDecoder;
use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol, ImageLayer};
use oci_distribution::manifest::{
    IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE, IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
    IMAGE_LAYER_GZIP_MEDIA_TYPE, IMAGE_LAYER_MEDIA_TYPE,
};
use oci_distribution::secrets::RegistryAuth;

use crate::archive::{TarballEntryReader, TarballReader};
use crate::context::Context;
use crate::credentials::Credentials;
use crate::error::{LocatorError, Result};
use crate::format::get_format;
use crate::pipe::pipe;
use crate::util::{join, origin_dir};

const DEFAULT_REGISTRY: &str = "docker.io";

/// Layer media types accepted when pulling
pub const LAYER_MEDIA_TYPES: &[&str] = &[
    IMAGE_LAYER_GZIP_MEDIA_TYPE,
    IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE,
    IMAGE_LAYER_MEDIA_TYPE,
    IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
];

/// Image reference: `registry/repository[:tag][@digest]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference
    ///
    /// A first segment without `.` or `:` (and not `localhost`) is part of
    /// the repository, and the registry defaults to Docker Hub.
    pub fn parse(s: &str) -> Result<Self> {
        let clean = s
            .trim_start_matches("oci://")
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        let (registry, rest) = match clean.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (first.to_string(), rest.to_string()),
            _ => (DEFAULT_REGISTRY.to_string(), clean.to_string()),
        };
        let rest = if registry == DEFAULT_REGISTRY && !rest.contains('/') {
            format!("library/{}", rest)
        } else {
            rest
        };

        let (repository, tag, digest) = split_tag_and_digest(&rest);
        if repository.is_empty() {
            return Err(LocatorError::parse(s, "missing image repository"));
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Reference to `path` resolved against this reference's repository
    fn resolve(&self, path: &str) -> Self {
        let (repository, tag, digest) = split_tag_and_digest(&join(&self.repository, path));
        Self {
            registry: self.registry.clone(),
            repository,
            tag,
            digest,
        }
    }

    fn to_oci(&self) -> Reference {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => Reference::with_digest(
                self.registry.clone(),
                self.repository.clone(),
                digest.clone(),
            ),
            (None, tag) => Reference::with_tag(
                self.registry.clone(),
                self.repository.clone(),
                tag.clone().unwrap_or_else(|| "latest".to_string()),
            ),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

fn split_tag_and_digest(reference: &str) -> (String, Option<String>, Option<String>) {
    let (name, digest) = match reference.rsplit_once('@') {
        Some((name, digest)) => (name, Some(digest.to_string())),
        None => (reference, None),
    };
    // A ':' before the last '/' belongs to a registry port, not a tag
    match name.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') => {
            (repository.to_string(), Some(tag.to_string()), digest)
        }
        _ => (name.to_string(), None, digest),
    }
}

/// Produces an image as a tarball of its layers
pub trait ImageSource: Send + Sync {
    /// Write the image to `writer` as a tar holding one `<digest>.tar.gz`
    /// file per compressed layer plus a `manifest.json`
    fn write_tarball(
        &self,
        reference: &ImageReference,
        credentials: Option<&Credentials>,
        writer: &mut dyn Write,
    ) -> Result<()>;
}

/// Pulls images from OCI distribution registries
#[derive(Debug, Clone)]
pub struct OciImageSource {
    protocol: ClientProtocol,
}

impl Default for OciImageSource {
    fn default() -> Self {
        Self {
            protocol: ClientProtocol::Https,
        }
    }
}

impl OciImageSource {
    /// Source talking plain HTTP, for local registries
    pub fn insecure() -> Self {
        Self {
            protocol: ClientProtocol::Http,
        }
    }
}

impl ImageSource for OciImageSource {
    fn write_tarball(
        &self,
        reference: &ImageReference,
        credentials: Option<&Credentials>,
        writer: &mut dyn Write,
    ) -> Result<()> {
        let client = Client::new(ClientConfig {
            protocol: self.protocol.clone(),
            ..Default::default()
        });
        let auth = registry_auth(credentials);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        tracing::info!("pulling image {}", reference);
        let image = runtime
            .block_on(client.pull(&reference.to_oci(), &auth, LAYER_MEDIA_TYPES.to_vec()))
            .map_err(|e| LocatorError::transport(format!("failed to pull {}: {}", reference, e)))?;

        write_image_tarball(reference, &image.config.data, &image.layers, writer)
    }
}

fn registry_auth(credentials: Option<&Credentials>) -> RegistryAuth {
    match credentials {
        // Registries exchange a token presented as the basic auth password
        Some(c) if !c.token.is_empty() => RegistryAuth::Basic(c.username.clone(), c.token.clone()),
        Some(c) if !c.username.is_empty() => {
            RegistryAuth::Basic(c.username.clone(), c.password.clone())
        }
        _ => RegistryAuth::Anonymous,
    }
}

fn is_gzip_layer(media_type: &str) -> bool {
    media_type == IMAGE_LAYER_GZIP_MEDIA_TYPE || media_type == IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE
}

/// Write pulled layers in the docker tarball layout
pub fn write_image_tarball(
    reference: &ImageReference,
    config: &[u8],
    layers: &[ImageLayer],
    writer: &mut dyn Write,
) -> Result<()> {
    let mut builder = tar::Builder::new(writer);
    add_bytes_to_archive(&mut builder, "config.json", config)?;

    let mut names = Vec::with_capacity(layers.len());
    for layer in layers {
        let digest = layer.sha256_digest();
        let hex = digest.trim_start_matches("sha256:");
        let name = if is_gzip_layer(&layer.media_type) {
            format!("{}.tar.gz", hex)
        } else {
            format!("{}.tar", hex)
        };
        add_bytes_to_archive(&mut builder, &name, &layer.data)?;
        names.push(name);
    }

    let manifest = serde_json::to_vec(&serde_json::json!([{
        "Config": "config.json",
        "RepoTags": [reference.to_string()],
        "Layers": names,
    }]))?;
    add_bytes_to_archive(&mut builder, "manifest.json", &manifest)?;

    builder.finish()?;
    Ok(())
}

fn add_bytes_to_archive<W: Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    data: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data)?;
    Ok(())
}

/// Decompressed content of the first `.tar.gz` entry of an image tarball
pub struct LayerDecoder {
    pending: Option<TarballReader>,
    layer: Option<MultiGzDecoder<TarballEntryReader>>,
}

impl LayerDecoder {
    pub fn new(tarball: Box<dyn Read + Send>) -> Self {
        Self {
            pending: Some(TarballReader::new(tarball)),
            layer: None,
        }
    }

    fn find_layer(reader: TarballReader) -> Result<MultiGzDecoder<TarballEntryReader>> {
        let entry = reader
            .open_where(|entry| entry.is_file() && entry.path.ends_with(".tar.gz"))?
            .ok_or_else(|| LocatorError::transport("\"*.tar.gz\" not found in tar"))?;
        tracing::debug!("decoding image layer {}", entry.entry().path);
        Ok(MultiGzDecoder::new(entry))
    }
}

impl Read for LayerDecoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(reader) = self.pending.take() {
            self.layer = Some(Self::find_layer(reader).map_err(LocatorError::into_io)?);
        }
        match &mut self.layer {
            Some(layer) => layer.read(buf),
            None => Err(LocatorError::transport("image layer unavailable").into_io()),
        }
    }
}

/// A container image, read as its first compressed layer
#[derive(Clone)]
pub struct DockerUrl {
    pub reference: ImageReference,
    /// Overrides the format derived from the repository name
    pub format: Option<String>,
    context: Arc<Context>,
}

impl fmt::Debug for DockerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerUrl")
            .field("reference", &self.reference.to_string())
            .field("format", &self.format)
            .finish()
    }
}

impl fmt::Display for DockerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "docker://{}", self.reference)?;
        if let Some(format) = &self.format {
            write!(f, "?format={}", format)?;
        }
        Ok(())
    }
}

impl DockerUrl {
    pub fn new(reference: ImageReference, context: &Arc<Context>) -> Self {
        Self {
            reference,
            format: None,
            context: context.clone(),
        }
    }

    /// Parse `docker:[//][user:password@]<host>/<repository>[:tag][?format=<fmt>]`
    pub fn parse(url: &str, context: &Arc<Context>) -> Result<Self> {
        let rest = url
            .strip_prefix("docker:")
            .ok_or_else(|| LocatorError::parse(url, "expected docker: scheme"))?;
        let rest = rest.strip_prefix("//").unwrap_or(rest);

        let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));
        let format = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "format")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty());

        let (credentials, rest) = split_userinfo(rest);
        let reference =
            ImageReference::parse(rest).map_err(|_| LocatorError::parse(url, "invalid image reference"))?;
        if let Some(credentials) = credentials {
            context.set_credentials(&reference.registry, credentials);
        }

        Ok(Self {
            reference,
            format,
            context: context.clone(),
        })
    }

    pub fn key(&self) -> String {
        format!("docker://{}", self.reference)
    }

    pub fn format(&self) -> String {
        self.format
            .clone()
            .unwrap_or_else(|| get_format(&self.reference.repository))
    }

    pub fn origin(&self) -> Self {
        self.with_reference(ImageReference {
            registry: self.reference.registry.clone(),
            repository: origin_dir(&self.reference.repository),
            tag: None,
            digest: None,
        })
    }

    pub fn relative(&self, path: &str) -> Self {
        self.with_reference(self.reference.resolve(path))
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    fn with_reference(&self, reference: ImageReference) -> Self {
        Self {
            reference,
            format: self.format.clone(),
            context: self.context.clone(),
        }
    }

    /// Only the reference syntax is checked; the registry is not contacted
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Start pulling on a producer thread and decode the first layer as it arrives
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        let source = self.context.image_source_for(&self.reference.registry);
        let credentials = self.context.credentials(&self.reference.registry);
        let reference = self.reference.clone();
        let (reader, mut writer) = pipe();

        thread::Builder::new()
            .name("image-producer".to_string())
            .spawn(move || {
                match source.write_tarball(&reference, credentials.as_ref(), &mut writer) {
                    Ok(()) => writer.close(),
                    Err(e) => {
                        tracing::debug!("image producer for {} failed: {}", reference, e);
                        writer.close_with_error(e);
                    }
                }
            })?;

        Ok(Box::new(LayerDecoder::new(Box::new(reader))))
    }
}

/// Split `user:password@` off the host segment of a reference
fn split_userinfo(reference: &str) -> (Option<Credentials>, &str) {
    let host_end = reference.find('/').unwrap_or(reference.len());
    match reference[..host_end].rsplit_once('@') {
        Some((userinfo, _)) => {
            let (username, password) = userinfo.split_once(':').unwrap_or((userinfo, ""));
            let credentials = Credentials::basic(
                crate::network::decode_userinfo(username),
                crate::network::decode_userinfo(password),
            );
            (Some(credentials), &reference[userinfo.len() + 1..])
        }
        None => (None, reference),
    }
}
