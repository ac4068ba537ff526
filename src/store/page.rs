use serde::{Deserialize, Serialize};

use crate::error::ContentError;

pub const MAX_PAGE_SIZE: u32 = 100;

/// 0 始まりのページ指定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
}

impl PageRequest {
    /// # Errors
    /// `size` が 1..=100 の範囲外なら [`ContentError::InvalidRequest`]。
    pub fn new(page: u32, size: u32) -> Result<Self, ContentError> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(ContentError::InvalidRequest(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {size}"
            )));
        }
        Ok(Self { page, size })
    }

    /// 既定サイズ。値域チェック済みの定数からのみ呼ぶ。
    #[must_use]
    pub const fn first(size: u32) -> Self {
        Self { page: 0, size }
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }

    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

/// ページング済みの結果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
    pub is_first: bool,
    pub is_last: bool,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: i64) -> Self {
        let size = i64::from(request.size().max(1));
        let total_pages = if total_elements <= 0 {
            0
        } else {
            (total_elements + size - 1) / size
        };
        let page = i64::from(request.page());
        Self {
            content,
            page: request.page(),
            size: request.size(),
            total_elements,
            total_pages,
            is_first: page == 0,
            is_last: page + 1 >= total_pages,
            has_next: page + 1 < total_pages,
            has_previous: page > 0,
        }
    }

    #[must_use]
    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request, 0)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            is_first: self.is_first,
            is_last: self.is_last,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }

    /// 内容だけを差し替える。件数情報はそのまま。
    #[must_use]
    pub fn with_content<U>(self, content: Vec<U>) -> Page<U> {
        Page {
            content,
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            is_first: self.is_first,
            is_last: self.is_last,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}
