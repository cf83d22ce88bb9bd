//! Commons API response shapes (private) and their conversion to public types.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::types::{CategoryInfo, FileInfo, MemberPage, MemberRef, PageContent};
use super::CommonsError;

/// Page key MediaWiki uses for titles that do not exist.
const MISSING_PAGE_KEY: &str = "-1";

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<Q> {
    error: Option<ApiErrorBody>,
    query: Option<Q>,
    #[serde(rename = "continue")]
    continuation: Option<Continuation>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct Continuation {
    #[serde(default)]
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PagesQuery<P> {
    #[serde(default = "HashMap::new")]
    pages: HashMap<String, P>,
}

fn decode<Q: DeserializeOwned>(body: &str) -> Result<(Option<Q>, Option<Continuation>), CommonsError> {
    let envelope: Envelope<Q> =
        serde_json::from_str(body).map_err(|e| CommonsError::Parse(e.to_string()))?;

    if let Some(err) = envelope.error {
        return Err(CommonsError::Upstream {
            code: err.code,
            info: err.info,
        });
    }

    Ok((envelope.query, envelope.continuation))
}

/// Returns the single entry of a `pages` map.
fn single_page<P>(query: Option<PagesQuery<P>>) -> Result<(String, P), CommonsError> {
    query
        .ok_or_else(|| CommonsError::MissingField("query".to_string()))?
        .pages
        .into_iter()
        .next()
        .ok_or_else(|| CommonsError::MissingField("query.pages".to_string()))
}

// ============================================================================
// list=categorymembers
// ============================================================================

#[derive(Debug, Deserialize)]
struct CategoryMembersQuery {
    categorymembers: Vec<RawMember>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    pageid: u64,
    title: String,
}

pub(super) fn parse_member_page(body: &str) -> Result<MemberPage, CommonsError> {
    let (query, continuation) = decode::<CategoryMembersQuery>(body)?;
    let query =
        query.ok_or_else(|| CommonsError::MissingField("query.categorymembers".to_string()))?;

    let members = query
        .categorymembers
        .into_iter()
        .map(|m| MemberRef {
            page_id: m.pageid,
            title: m.title,
        })
        .collect();

    Ok(MemberPage {
        members,
        continuation: continuation.and_then(|c| c.cmcontinue),
    })
}

// ============================================================================
// prop=imageinfo
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawImagePage {
    #[serde(default)]
    pageid: Option<u64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    missing: Option<serde_json::Value>,
    #[serde(default)]
    imageinfo: Option<Vec<RawImageInfo>>,
}

#[derive(Debug, Deserialize)]
struct RawImageInfo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    descriptionurl: Option<String>,
}

pub(super) fn parse_file_info(body: &str) -> Result<FileInfo, CommonsError> {
    let (query, _) = decode::<PagesQuery<RawImagePage>>(body)?;
    let (key, page) = single_page(query)?;

    if key == MISSING_PAGE_KEY || page.missing.is_some() {
        return Err(CommonsError::NotFound(format!("page {}", key)));
    }

    let page_id = match page.pageid {
        Some(id) => id,
        None => key
            .parse()
            .map_err(|_| CommonsError::Parse(format!("invalid page key '{}'", key)))?,
    };

    let title = page
        .title
        .ok_or_else(|| CommonsError::MissingField(format!("query.pages.{}.title", key)))?;

    let info = page
        .imageinfo
        .and_then(|infos| infos.into_iter().next())
        .ok_or_else(|| CommonsError::MissingField(format!("query.pages.{}.imageinfo", key)))?;

    let image_url = info
        .url
        .ok_or_else(|| CommonsError::MissingField(format!("query.pages.{}.imageinfo.url", key)))?;
    let description_url = info.descriptionurl.ok_or_else(|| {
        CommonsError::MissingField(format!("query.pages.{}.imageinfo.descriptionurl", key))
    })?;

    Ok(FileInfo {
        page_id,
        title,
        image_url,
        description_url,
    })
}

// ============================================================================
// prop=categoryinfo
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawCategoryPage {
    #[serde(default)]
    missing: Option<serde_json::Value>,
    #[serde(default)]
    categoryinfo: Option<RawCategoryInfo>,
}

#[derive(Debug, Deserialize)]
struct RawCategoryInfo {
    #[serde(default)]
    files: u64,
}

pub(super) fn parse_category_info(body: &str) -> Result<CategoryInfo, CommonsError> {
    let (query, _) = decode::<PagesQuery<RawCategoryPage>>(body)?;
    let (key, page) = single_page(query)?;

    if key == MISSING_PAGE_KEY || page.missing.is_some() {
        return Ok(CategoryInfo::not_found());
    }

    // An existing category page with no members carries no categoryinfo.
    Ok(CategoryInfo {
        found: true,
        file_count: page.categoryinfo.map(|ci| ci.files).unwrap_or(0),
    })
}

// ============================================================================
// prop=revisions
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawContentPage {
    #[serde(default)]
    missing: Option<serde_json::Value>,
    #[serde(default)]
    revisions: Option<Vec<RawRevision>>,
}

#[derive(Debug, Deserialize)]
struct RawRevision {
    #[serde(default)]
    slots: Option<RawSlots>,
    /// Pre-MCR layout, content directly on the revision.
    #[serde(rename = "*", default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSlots {
    main: RawSlot,
}

#[derive(Debug, Deserialize)]
struct RawSlot {
    #[serde(rename = "*", default)]
    content: Option<String>,
}

pub(super) fn parse_page_content(body: &str) -> Result<PageContent, CommonsError> {
    let (query, _) = decode::<PagesQuery<RawContentPage>>(body)?;
    let (key, page) = single_page(query)?;

    if key == MISSING_PAGE_KEY || page.missing.is_some() {
        return Ok(PageContent::missing());
    }

    let revision = page
        .revisions
        .and_then(|revs| revs.into_iter().next())
        .ok_or_else(|| CommonsError::MissingField(format!("query.pages.{}.revisions", key)))?;

    let content = revision
        .slots
        .and_then(|s| s.main.content)
        .or(revision.content)
        .ok_or_else(|| {
            CommonsError::MissingField(format!("query.pages.{}.revisions.content", key))
        })?;

    Ok(PageContent {
        found: true,
        raw_content: content,
    })
}
