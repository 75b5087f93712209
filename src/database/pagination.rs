use serde::{Deserialize, Serialize};

use crate::{
    constants::MAX_PAGE_SIZE,
    error::{ApiError, FieldErrors},
};

/// `?page=&limit=` as sent by clients.
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub page_size: i64,
    pub offset: i64,
}

impl PageQuery {
    /// Picks `page` and `limit` out of a raw query string, ignoring other keys.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ApiError> {
        let mut query = Self::default();
        let mut errors = FieldErrors::new();

        for (key, value) in pairs {
            let slot = match key.as_str() {
                "page" => &mut query.page,
                "limit" => &mut query.limit,
                _ => continue,
            };
            match value.trim().parse::<i64>() {
                Ok(number) => *slot = Some(number),
                Err(_) => errors.add(key, "A valid integer is required"),
            }
        }

        // The offset of the largest allowed page must fit in a BIGINT.
        if let Some(page) = query.page {
            if page.saturating_sub(1).max(0).checked_mul(MAX_PAGE_SIZE).is_none() {
                errors.add("page", "Invalid page");
            }
        }

        errors.into_result()?;
        Ok(query)
    }

    pub fn window(&self, default_size: i64) -> PageWindow {
        let page_size = self.limit.unwrap_or(default_size).clamp(1, MAX_PAGE_SIZE);
        let page = self.page.unwrap_or(1).max(1);

        PageWindow {
            page,
            page_size,
            offset: (page - 1).saturating_mul(page_size),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// Builds the envelope from rows carrying `COUNT(*) OVER()`. The total is
    /// unknown when a page past the first comes back empty, so that page is
    /// reported as missing.
    pub fn from_rows(rows: Vec<T>, total_rows: i64, window: PageWindow) -> Result<Self, ApiError> {
        if rows.is_empty() {
            if window.page > 1 {
                return Err(ApiError::NotFound(String::from("Invalid page")));
            }
            return Ok(Self::no_rows());
        }

        let last_page = (total_rows + window.page_size - 1) / window.page_size;

        Ok(Self {
            count: total_rows,
            next: (window.page < last_page).then_some(window.page + 1),
            previous: (window.page > 1).then_some(window.page - 1),
            results: rows,
        })
    }

    pub fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }
}
