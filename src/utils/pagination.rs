use serde::{Deserialize, Serialize};

/// Standard list-endpoint envelope.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            data,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// Clamp to sane bounds: page ≥ 1, limit in [1, 200].
    pub fn clamp(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(50).clamp(1, 200);
        (page, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_values() {
        let q = PageQuery {
            page: Some(0),
            limit: Some(10_000),
        };
        assert_eq!(q.clamp(), (1, 200));

        let q = PageQuery {
            page: None,
            limit: None,
        };
        assert_eq!(q.clamp(), (1, 50));
    }

    #[test]
    fn total_pages_rounds_up() {
        let r: PaginatedResponse<u8> = PaginatedResponse::new(vec![], 101, 1, 50);
        assert_eq!(r.total_pages, 3);
    }
}
