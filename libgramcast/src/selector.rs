//! Content selection and rotation cursors
//!
//! Every selection comes in two flavors. `peek`/`candidate` operations read
//! the rotation state and leave it untouched, so a preview can show what
//! would be published next. `commit`/`pick`/`mark` operations advance the
//! state and persist it immediately; nothing here rolls a commit back when a
//! later publish step fails.
//!
//! Image filenames are derived from the image cursor (`img (N).jpg` or
//! `ram (N).jpg`, see [`ImageNaming`](crate::types::ImageNaming)). Videos come
//! from a fixed pool of 200 names: `vid.mp4` and `vid (1).mp4` through
//! `vid (199).mp4`.

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

use crate::captions::CaptionSource;
use crate::error::{FetchError, Result};
use crate::state::{Cursor, StateStore};
use crate::types::{normalize_base, Account, ContentType};

/// Extra image candidates offered on top of the slide count
pub const EXTRA_IMAGE_CANDIDATES: usize = 3;

/// Number of names in the video pool
pub const VIDEO_POOL_SIZE: usize = 200;

/// Every video filename, in enumeration order
pub fn video_file_names() -> impl Iterator<Item = String> {
    std::iter::once("vid.mp4".to_string())
        .chain((1..VIDEO_POOL_SIZE).map(|i| format!("vid ({}).mp4", i)))
}

/// Absolute URL of `file_name` under `base`
///
/// The filename is percent-encoded as a single path segment, so spaces and
/// parentheses are escaped as well.
pub fn media_url(base: &str, file_name: &str) -> String {
    format!("{}/{}", normalize_base(base), urlencoding::encode(file_name))
}

/// Decoded last path component of a media URL
pub fn file_name_from_url(url: &str) -> String {
    let raw = url.rsplit('/').next().unwrap_or(url);
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Computes and commits the next caption, images and videos of an account
#[derive(Clone)]
pub struct ContentSelector {
    state: Arc<dyn StateStore>,
    captions: Arc<dyn CaptionSource>,
}

impl ContentSelector {
    pub fn new(state: Arc<dyn StateStore>, captions: Arc<dyn CaptionSource>) -> Self {
        Self { state, captions }
    }

    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    async fn caption_at_cursor(&self, account: &Account) -> Result<(String, u64)> {
        let url = account.caption_url()?;
        let lines = self.captions.fetch_lines(url).await?;
        if lines.is_empty() {
            return Err(FetchError::EmptyCaptionList(url.to_string()).into());
        }

        let cursor = self.state.load_cursor(account.state_key(), Cursor::Caption)?;
        let index = (cursor % lines.len() as u64) as usize;
        Ok((lines[index].clone(), cursor))
    }

    /// Caption the next commit would return
    pub async fn peek_caption(&self, account: &Account) -> Result<String> {
        let (caption, _) = self.caption_at_cursor(account).await?;
        Ok(caption)
    }

    /// Return the current caption and advance the caption cursor by one
    pub async fn commit_caption(&self, account: &Account) -> Result<String> {
        let (caption, cursor) = self.caption_at_cursor(account).await?;
        self.state
            .save_cursor(account.state_key(), Cursor::Caption, cursor + 1)?;
        tracing::debug!(
            account = account.display_name(),
            cursor = cursor + 1,
            "Caption cursor advanced"
        );
        Ok(caption)
    }

    fn image_urls(&self, account: &Account, start_after: u64, count: usize) -> Result<Vec<String>> {
        let base = account.image_base_url()?;
        let naming = account.naming();
        Ok((1..=count as u64)
            .map(|i| media_url(base, &naming.file_name(start_after + i)))
            .collect())
    }

    /// `count + 3` upcoming image URLs, without moving the cursor
    ///
    /// `count` defaults to the account's slides per post. Accounts that do
    /// not publish carousels have no candidates.
    pub fn candidate_images(&self, account: &Account, count: Option<usize>) -> Result<Vec<String>> {
        if account.content_type != ContentType::Carousel {
            return Ok(Vec::new());
        }
        let count = count.unwrap_or(account.slides_per_post() as usize);
        let cursor = self.state.load_cursor(account.state_key(), Cursor::Image)?;
        self.image_urls(account, cursor, count + EXTRA_IMAGE_CANDIDATES)
    }

    /// The next `count` image URLs; the image cursor advances by `count`
    pub fn commit_images(&self, account: &Account, count: usize) -> Result<Vec<String>> {
        let cursor = self.state.load_cursor(account.state_key(), Cursor::Image)?;
        let urls = self.image_urls(account, cursor, count)?;
        self.state
            .save_cursor(account.state_key(), Cursor::Image, cursor + count as u64)?;
        Ok(urls)
    }

    /// [`commit_images`](Self::commit_images) for the configured slide count
    pub fn commit_slides(&self, account: &Account) -> Result<Vec<String>> {
        self.commit_images(account, account.slides_per_post() as usize)
    }

    /// Advance the image cursor by a count chosen elsewhere
    ///
    /// Returns the new cursor.
    pub fn advance_images(&self, account: &Account, count: usize) -> Result<u64> {
        let cursor = self.state.load_cursor(account.state_key(), Cursor::Image)?;
        let next = cursor + count as u64;
        self.state
            .save_cursor(account.state_key(), Cursor::Image, next)?;
        Ok(next)
    }

    fn unused_videos(&self, account: &Account) -> Result<Vec<String>> {
        let used = self.state.load_used_videos(account.state_key())?;
        Ok(video_file_names()
            .filter(|name| !used.contains(name))
            .collect())
    }

    /// First `k` unused video URLs in pool order, without marking them
    pub fn candidate_videos(&self, account: &Account, k: usize) -> Result<Vec<String>> {
        if account.content_type != ContentType::Reel {
            return Ok(Vec::new());
        }
        let base = account.video_base_url()?;
        Ok(self
            .unused_videos(account)?
            .iter()
            .take(k)
            .map(|name| media_url(base, name))
            .collect())
    }

    /// Pick an unused video uniformly at random and mark it used
    ///
    /// Returns `None` once the whole pool has been published.
    pub fn pick_random_video(&self, account: &Account) -> Result<Option<String>> {
        self.pick_random_video_with(account, &mut rand::thread_rng())
    }

    /// [`pick_random_video`](Self::pick_random_video) with a caller-provided RNG
    pub fn pick_random_video_with<R: Rng + ?Sized>(
        &self,
        account: &Account,
        rng: &mut R,
    ) -> Result<Option<String>> {
        let base = account.video_base_url()?;
        let unused = self.unused_videos(account)?;

        let Some(pick) = unused.choose(rng) else {
            return Ok(None);
        };

        let mut used = self.state.load_used_videos(account.state_key())?;
        used.insert(pick.clone());
        self.state.save_used_videos(account.state_key(), &used)?;

        tracing::debug!(
            account = account.display_name(),
            video = %pick,
            remaining = unused.len() - 1,
            "Picked video"
        );
        Ok(Some(media_url(base, pick)))
    }

    /// Record the video behind `url` as published
    pub fn mark_video_used(&self, account: &Account, url: &str) -> Result<()> {
        let name = file_name_from_url(url);
        let mut used = self.state.load_used_videos(account.state_key())?;
        if used.insert(name) {
            self.state.save_used_videos(account.state_key(), &used)?;
        }
        Ok(())
    }
}
