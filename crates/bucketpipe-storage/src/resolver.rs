//! Destination and filename resolvers
//!
//! A resolver computes one half of a storage key for a given upload. The
//! adapter calls the destination resolver first and the filename resolver
//! second, once each per file.

use crate::models::{FileInfo, UploadContext};
use crate::traits::ResolverError;
use async_trait::async_trait;
use bucketpipe_core::FilenameStrategy;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Computes a key component from the request context and file metadata.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, ctx: &UploadContext, file: &FileInfo) -> Result<String, ResolverError>;
}

/// Closure-backed resolver, see [`resolver_fn`].
pub struct FnResolver<F>(F);

/// Wrap an async closure as a resolver.
///
/// The returned future must not borrow its arguments; clone what it needs:
///
/// ```
/// use bucketpipe_storage::resolver::resolver_fn;
/// use bucketpipe_storage::ResolverError;
///
/// let by_user = resolver_fn(|ctx, _file| {
///     let user = ctx.field("user").unwrap_or("anonymous").to_string();
///     async move { Ok::<_, ResolverError>(format!("users/{}", user)) }
/// });
/// # let _ = by_user;
/// ```
pub fn resolver_fn<F, Fut>(f: F) -> Arc<dyn Resolver>
where
    F: Fn(&UploadContext, &FileInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, ResolverError>> + Send + 'static,
{
    Arc::new(FnResolver(f))
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn(&UploadContext, &FileInfo) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ResolverError>> + Send,
{
    async fn resolve(&self, ctx: &UploadContext, file: &FileInfo) -> Result<String, ResolverError> {
        (self.0)(ctx, file).await
    }
}

/// Always returns the same value. `Fixed::default()` is the empty prefix.
#[derive(Debug, Clone, Default)]
pub struct Fixed(pub String);

impl Fixed {
    pub fn new(value: impl Into<String>) -> Self {
        Fixed(value.into())
    }
}

#[async_trait]
impl Resolver for Fixed {
    async fn resolve(&self, _ctx: &UploadContext, _file: &FileInfo) -> Result<String, ResolverError> {
        Ok(self.0.clone())
    }
}

/// Passes the client-supplied file name through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginalName;

#[async_trait]
impl Resolver for OriginalName {
    async fn resolve(&self, _ctx: &UploadContext, file: &FileInfo) -> Result<String, ResolverError> {
        Ok(file.original_name.clone())
    }
}

/// `<unix millis>_<original name with spaces replaced by underscores>`
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampedName;

#[async_trait]
impl Resolver for TimestampedName {
    async fn resolve(&self, _ctx: &UploadContext, file: &FileInfo) -> Result<String, ResolverError> {
        Ok(format!(
            "{}_{}",
            chrono::Utc::now().timestamp_millis(),
            file.original_name.replace(' ', "_")
        ))
    }
}

/// `<uuid v4>.<original extension>`, or a bare uuid when there is no extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidName;

#[async_trait]
impl Resolver for UuidName {
    async fn resolve(&self, _ctx: &UploadContext, file: &FileInfo) -> Result<String, ResolverError> {
        let id = Uuid::new_v4();
        match file.original_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                Ok(format!("{}.{}", id, ext.to_lowercase()))
            }
            _ => Ok(id.to_string()),
        }
    }
}

/// Filename resolver for a configured strategy.
pub fn filename_resolver(strategy: FilenameStrategy) -> Arc<dyn Resolver> {
    match strategy {
        FilenameStrategy::Original => Arc::new(OriginalName),
        FilenameStrategy::Timestamped => Arc::new(TimestampedName),
        FilenameStrategy::Uuid => Arc::new(UuidName),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> FileInfo {
        FileInfo::new("file", name, "text/plain")
    }

    #[tokio::test]
    async fn test_fixed_default_is_empty() {
        let ctx = UploadContext::new();
        let prefix = Fixed::default().resolve(&ctx, &file("a.txt")).await.unwrap();
        assert_eq!(prefix, "");
    }

    #[tokio::test]
    async fn test_original_name_unchanged() {
        let ctx = UploadContext::new();
        let name = OriginalName
            .resolve(&ctx, &file("My Report.TXT"))
            .await
            .unwrap();
        assert_eq!(name, "My Report.TXT");
    }

    #[tokio::test]
    async fn test_timestamped_name_replaces_spaces() {
        let ctx = UploadContext::new();
        let name = TimestampedName
            .resolve(&ctx, &file("my test file.txt"))
            .await
            .unwrap();
        let (millis, rest) = name.split_once('_').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(rest, "my_test_file.txt");
    }

    #[tokio::test]
    async fn test_uuid_name_keeps_extension() {
        let ctx = UploadContext::new();
        let name = UuidName.resolve(&ctx, &file("photo.PNG")).await.unwrap();
        let (id, ext) = name.split_once('.').unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(ext, "png");

        let bare = UuidName.resolve(&ctx, &file("README")).await.unwrap();
        assert!(Uuid::parse_str(&bare).is_ok());
    }

    #[tokio::test]
    async fn test_resolver_fn_reads_context_fields() {
        let ctx = UploadContext::new().with_field("user", "ada");
        let resolver = resolver_fn(|ctx, file| {
            let user = ctx.field("user").unwrap_or("anonymous").to_string();
            let name = file.original_name.clone();
            async move { Ok::<_, ResolverError>(format!("{}/{}", user, name)) }
        });
        let value = resolver.resolve(&ctx, &file("a.txt")).await.unwrap();
        assert_eq!(value, "ada/a.txt");
    }

    #[tokio::test]
    async fn test_resolver_fn_propagates_error() {
        let ctx = UploadContext::new();
        let resolver = resolver_fn(|_ctx, _file| async {
            Err::<String, ResolverError>("quota exceeded".into())
        });
        let err = resolver.resolve(&ctx, &file("a.txt")).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
