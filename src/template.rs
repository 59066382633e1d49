use askama_actix::Template;

const PAGINATOR_LOOK_AHEAD: i32 = 2;

/// [1] 2 3 ... 13
/// 1 2 [3] 4 5 ... 13
/// 1 2 3 4 [5] 6 7 ... 13
/// 1 ... 4 5 [6] 7 8 ... 13
/// 1 ... 7 8 [9] 10 11 12 13
/// 1 ... 9 10 [11] 12 13
/// 1 ... 11 12 [13]
#[derive(Debug)]
pub struct Paginator {
    /// URL prefix page numbers are appended to, e.g. `/categories/3?page=`.
    pub base_url: String,
    pub this_page: i32,
    pub page_count: i32,
}

#[derive(Template)]
#[template(path = "util/paginator.html")]
struct PaginatorTemplate<'a> {
    paginator: &'a Paginator,
}

pub trait PaginatorToHtml {
    fn as_html(&self) -> String;
    fn has_pages(&self) -> bool;
    fn is_current_page(&self, page: &i32) -> bool;
    fn get_first_pages(&self) -> Vec<i32>;
    fn get_inner_pages(&self) -> Option<Vec<i32>>;
    fn get_last_pages(&self) -> Option<Vec<i32>>;
}

impl Paginator {
    /// The cursor window reaches back to the leading pages.
    fn near_start(&self) -> bool {
        self.this_page - PAGINATOR_LOOK_AHEAD <= 1 + PAGINATOR_LOOK_AHEAD
    }

    /// The cursor window reaches forward to the trailing pages.
    fn near_end(&self) -> bool {
        self.this_page + PAGINATOR_LOOK_AHEAD >= self.page_count - PAGINATOR_LOOK_AHEAD
    }
}

impl PaginatorToHtml for Paginator {
    fn has_pages(&self) -> bool {
        self.page_count > 1
    }

    fn is_current_page(&self, page: &i32) -> bool {
        *page == self.this_page
    }

    fn get_first_pages(&self) -> Vec<i32> {
        let range = if self.near_start() && self.near_end() {
            // Short list, show everything. i.e. 1 2 [3] 4 5
            1..=self.page_count
        } else if self.near_start() {
            // Cursor window merges into the head. i.e. 1 2 [3] 4 5 ... 13
            1..=(self.this_page + PAGINATOR_LOOK_AHEAD)
        } else {
            // Cursor is somewhere deeper; the head is just page 1.
            1..=1
        };
        range.collect()
    }

    fn get_inner_pages(&self) -> Option<Vec<i32>> {
        if self.near_start() || self.near_end() {
            // The cursor window merged into the head or tail.
            None
        } else {
            // Detached cursor window. i.e. 1 ... 4 5 [6] 7 8 ... 13
            let range =
                (self.this_page - PAGINATOR_LOOK_AHEAD)..=(self.this_page + PAGINATOR_LOOK_AHEAD);
            Some(range.collect())
        }
    }

    fn get_last_pages(&self) -> Option<Vec<i32>> {
        if self.near_start() && self.near_end() {
            // Everything already in the head.
            None
        } else if self.near_end() {
            // Cursor window merges into the tail. i.e. 1 ... 9 10 [11] 12 13
            Some(((self.this_page - PAGINATOR_LOOK_AHEAD)..=self.page_count).collect())
        } else {
            // Tail is just the last page.
            Some((self.page_count..=self.page_count).collect())
        }
    }

    fn as_html(&self) -> String {
        if self.has_pages() {
            let mut buffer = String::new();
            let template = PaginatorTemplate { paginator: self };
            if template.render_into(&mut buffer).is_err() {
                "[Paginator Util Error]".to_owned()
            } else {
                buffer
            }
        } else {
            String::new()
        }
    }
}

/// Number of pages needed for `total` items, never less than 1.
pub fn page_count(total: u64, per_page: u64) -> i32 {
    if total == 0 {
        1
    } else {
        ((total + per_page - 1) / per_page) as i32
    }
}

/// Clamp a requested 1-based page number into the valid range, mirroring
/// the behavior of a forgiving paginator: out-of-range requests land on the
/// nearest valid page instead of erroring.
pub fn clamp_page(page: i32, page_count: i32) -> i32 {
    page.clamp(1, page_count.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paginator(this_page: i32, page_count: i32) -> Paginator {
        Paginator {
            base_url: "/categories/1?page=".to_owned(),
            this_page,
            page_count,
        }
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0, 2), 1);
        assert_eq!(page_count(1, 2), 1);
        assert_eq!(page_count(2, 2), 1);
        assert_eq!(page_count(3, 2), 2);
        assert_eq!(page_count(5, 2), 3);
    }

    #[test]
    fn test_clamp_page() {
        assert_eq!(clamp_page(0, 3), 1);
        assert_eq!(clamp_page(-5, 3), 1);
        assert_eq!(clamp_page(2, 3), 2);
        assert_eq!(clamp_page(99, 3), 3);
        // Even an empty result set has one (empty) page.
        assert_eq!(clamp_page(7, 0), 1);
    }

    #[test]
    fn test_head_merged_window() {
        // [1] 2 3 ... 13
        let p = paginator(1, 13);
        assert_eq!(p.get_first_pages(), vec![1, 2, 3]);
        assert_eq!(p.get_inner_pages(), None);
        assert_eq!(p.get_last_pages(), Some(vec![13]));

        // 1 2 3 4 [5] 6 7 ... 13
        let p = paginator(5, 13);
        assert_eq!(p.get_first_pages(), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(p.get_inner_pages(), None);
        assert_eq!(p.get_last_pages(), Some(vec![13]));
    }

    #[test]
    fn test_detached_window() {
        // 1 ... 4 5 [6] 7 8 ... 13
        let p = paginator(6, 13);
        assert_eq!(p.get_first_pages(), vec![1]);
        assert_eq!(p.get_inner_pages(), Some(vec![4, 5, 6, 7, 8]));
        assert_eq!(p.get_last_pages(), Some(vec![13]));
    }

    #[test]
    fn test_tail_merged_window() {
        // 1 ... 7 8 [9] 10 11 12 13
        let p = paginator(9, 13);
        assert_eq!(p.get_first_pages(), vec![1]);
        assert_eq!(p.get_inner_pages(), None);
        assert_eq!(p.get_last_pages(), Some(vec![7, 8, 9, 10, 11, 12, 13]));

        // 1 ... 11 12 [13]
        let p = paginator(13, 13);
        assert_eq!(p.get_first_pages(), vec![1]);
        assert_eq!(p.get_last_pages(), Some(vec![11, 12, 13]));
    }

    #[test]
    fn test_short_list_is_one_window() {
        let p = paginator(3, 5);
        assert_eq!(p.get_first_pages(), vec![1, 2, 3, 4, 5]);
        assert_eq!(p.get_inner_pages(), None);
        assert_eq!(p.get_last_pages(), None);
    }

    #[test]
    fn test_single_page_has_no_pagination() {
        let p = paginator(1, 1);
        assert!(!p.has_pages());
        assert_eq!(p.as_html(), "");
    }
}
