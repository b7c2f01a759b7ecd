use url::Url;

/// Name of the query parameter carrying the listing page number
pub const PAGE_PARAM: &str = "page";

/// Builds the URL of the next listing page
///
/// Increments an existing numeric `page` query parameter, or appends
/// `page=2` when the URL has none (the URL without the parameter is page 1).
/// Every other query parameter is kept in place. Returns `Ok(None)` when the
/// page number cannot be incremented any further.
///
/// # Examples
///
/// ```
/// use catalog_harvest::url::next_page_url;
///
/// assert_eq!(
///     next_page_url("https://example.com/c/devops").unwrap().as_deref(),
///     Some("https://example.com/c/devops?page=2")
/// );
/// assert_eq!(
///     next_page_url("https://example.com/c/devops?sort=name&page=4").unwrap().as_deref(),
///     Some("https://example.com/c/devops?sort=name&page=5")
/// );
/// ```
pub fn next_page_url(url: &str) -> Result<Option<String>, url::ParseError> {
    let mut parsed = Url::parse(url)?;

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut bumped = false;
    for (key, value) in pairs.iter_mut() {
        if key == PAGE_PARAM {
            let current = value.parse::<u32>().unwrap_or(1);
            let Some(next) = current.checked_add(1) else {
                return Ok(None);
            };
            *value = next.to_string();
            bumped = true;
            break;
        }
    }
    if !bumped {
        pairs.push((PAGE_PARAM.to_string(), "2".to_string()));
    }

    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(Some(parsed.to_string()))
}

/// Pulls `(current_page, max_page)` out of a marker such as "Page 2 of 7"
///
/// The first two integers in the text are taken as the current and maximum
/// page. Returns `None` when fewer than two integers are present.
pub fn parse_page_marker(text: &str) -> Option<(u32, u32)> {
    let mut numbers = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u32>().ok());

    let current = numbers.next()?;
    let max = numbers.next()?;
    Some((current, max))
}
