use super::repo::ContactRepository;
use super::repo_types::{name_initial, Contact};
use crate::error::{AppError, AppResult};

pub const DEFAULT_LIMIT: i64 = 20;

/// 1-indexed page number and page size, both at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    limit: i64,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> AppResult<Self> {
        if page < 1 {
            return Err(AppError::validation("page must be >= 1"));
        }
        if limit < 1 {
            return Err(AppError::validation("limit must be >= 1"));
        }
        Ok(Self { page, limit })
    }

    /// `None` when the page lies past the end of `total_pages` or the offset would overflow.
    fn offset_within(&self, total_pages: i64) -> Option<i64> {
        if self.page > total_pages {
            return None;
        }
        (self.page - 1).checked_mul(self.limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    initial: Option<String>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Exactly one character, matched case-insensitively against the start of the name.
    pub fn starts_with(raw: &str) -> AppResult<Self> {
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Self {
                initial: Some(name_initial(&c.to_string())),
            }),
            _ => Err(AppError::validation("starts_with must be a single character")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub total_items: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_items: self.total_items,
        }
    }
}

pub fn total_pages(total_items: i64, limit: i64) -> i64 {
    if total_items <= 0 {
        0
    } else {
        (total_items - 1) / limit + 1
    }
}

/// Filtered, paginated listing of one owner's contacts, ordered by id.
pub struct PaginatedQueryEngine<'a> {
    repo: &'a ContactRepository,
}

impl<'a> PaginatedQueryEngine<'a> {
    pub fn new(repo: &'a ContactRepository) -> Self {
        Self { repo }
    }

    /// A page past the end yields no items but still reports the real totals.
    pub async fn list(
        &self,
        owner_id: i64,
        filter: &ListFilter,
        req: PageRequest,
    ) -> AppResult<Page<Contact>> {
        let initial = filter.initial.as_deref();
        let total_items = self.repo.count(owner_id, initial).await?;
        let total_pages = total_pages(total_items, req.limit);

        let items = match req.offset_within(total_pages) {
            Some(offset) => {
                self.repo
                    .list_window(owner_id, initial, req.limit, offset)
                    .await?
            }
            None => Vec::new(),
        };

        Ok(Page {
            items,
            page: req.page,
            limit: req.limit,
            total_pages,
            total_items,
        })
    }
}
