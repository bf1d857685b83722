//! Parses one rendered theater/date listing into showtime records.
//!
//! Every lookup returns an `Option`; a missing title, time or link skips
//! just that movie or showtime and is noted as a [`SkipReason`].

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

use crate::Showtime;
use crate::error::ScrapeError;
use crate::format::FormatResolver;
use crate::id::showtime_id;
use crate::orchestrator::SkipReason;

/// Present once the listing's asynchronous content has rendered.
pub const READY_SELECTOR: &str = r#"li[data-qa="movie"]"#;

struct Selectors {
    movie: Selector,
    title: Selector,
    score_block: Selector,
    score: Selector,
    format_section: Selector,
    variant_title: Selector,
    amenity_group: Selector,
    amenity_list: Selector,
    amenity_button: Selector,
    showtime_link: Selector,
    time: Selector,
    address: Selector,
}

fn parse(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl Selectors {
    fn new() -> Result<Self, ScrapeError> {
        Ok(Self {
            movie: parse(READY_SELECTOR)?,
            title: parse("span.sr-text")?,
            score_block: parse(r#"div[class*="DivMovieScores"]"#)?,
            score: parse(
                r#"span[data-qa*="fresh-score"], span[data-qa*="certified_fresh-score"], span[data-qa*="rotten-score"]"#,
            )?,
            format_section: parse(r#"section[class*="showtime-options"]"#)?,
            variant_title: parse(r#"div[class*="DivVariantTitle"]"#)?,
            amenity_group: parse(r#"section[class*="AmenityGroup"]"#)?,
            amenity_list: parse(r#"ul[data-qa="AmenityList"]"#)?,
            amenity_button: parse("button")?,
            showtime_link: parse(r#"a[class*="AShowtime"]"#)?,
            time: parse("span")?,
            address: parse(r#"span[data-qa="address"]"#)?,
        })
    }
}

/// Which page is being parsed. The date is the one requested, never read
/// from the markup.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub theater: &'a str,
    pub date: NaiveDate,
}

#[derive(Debug, Default)]
pub struct PageExtraction {
    /// Movie entries found, including ones skipped for lack of a title.
    pub movies: usize,
    pub showtimes: Vec<Showtime>,
    pub skips: Vec<SkipReason>,
}

pub struct PageExtractor {
    selectors: Selectors,
    resolver: FormatResolver,
    site_origin: String,
}

impl PageExtractor {
    pub fn new(resolver: FormatResolver, site_origin: impl Into<String>) -> Result<Self, ScrapeError> {
        Ok(Self {
            selectors: Selectors::new()?,
            resolver,
            site_origin: site_origin.into(),
        })
    }

    /// Theater address, with line breaks folded into spaces.
    pub fn extract_address(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        doc.select(&self.selectors.address)
            .next()
            .map(|span| text_of(span).replace('\n', " "))
    }

    pub fn extract(&self, html: &str, ctx: PageContext<'_>) -> PageExtraction {
        let doc = Html::parse_document(html);
        let mut out = PageExtraction::default();

        for movie in doc.select(&self.selectors.movie) {
            out.movies += 1;
            self.extract_movie(movie, ctx, &mut out);
        }
        out
    }

    fn extract_movie(&self, movie: ElementRef<'_>, ctx: PageContext<'_>, out: &mut PageExtraction) {
        let s = &self.selectors;
        let Some(title) = first_text(movie, &s.title) else {
            out.skips.push(SkipReason::MissingTitle {
                theater: ctx.theater.to_string(),
                date: ctx.date,
            });
            return;
        };
        let score = self.score(movie);

        for section in movie.select(&s.format_section) {
            let raw_label = first_text(section, &s.variant_title);

            for group in section.select(&s.amenity_group) {
                let amenities: Vec<String> = group
                    .select(&s.amenity_list)
                    .next()
                    .map(|list| list.select(&s.amenity_button).map(text_of).collect())
                    .unwrap_or_default();
                let format = self.resolver.resolve(raw_label.as_deref(), &amenities);

                for link in group.select(&s.showtime_link) {
                    let Some(time) = first_text(link, &s.time) else {
                        out.skips.push(SkipReason::MissingTime {
                            theater: ctx.theater.to_string(),
                            date: ctx.date,
                            movie: title.clone(),
                        });
                        continue;
                    };
                    let Some(href) = link
                        .value()
                        .attr("href")
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                    else {
                        out.skips.push(SkipReason::MissingLink {
                            theater: ctx.theater.to_string(),
                            date: ctx.date,
                            movie: title.clone(),
                        });
                        continue;
                    };

                    out.showtimes.push(Showtime {
                        id: showtime_id(ctx.theater, &title, ctx.date, &time),
                        theater: ctx.theater.to_string(),
                        movie: title.clone(),
                        format: format.clone(),
                        amenities: amenities.clone(),
                        date: ctx.date,
                        rottentomatoes_score: score.clone(),
                        time,
                        url: self.absolute_url(href),
                    });
                }
            }
        }
    }

    fn score(&self, movie: ElementRef<'_>) -> Option<String> {
        let block = movie.select(&self.selectors.score_block).next()?;
        first_text(block, &self.selectors.score)
    }

    fn absolute_url(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{}{}", self.site_origin.trim_end_matches('/'), href)
        } else {
            format!("{}/{}", self.site_origin.trim_end_matches('/'), href)
        }
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Trimmed text of the first match; empty text counts as absent.
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://tickets.example";

    fn extractor() -> PageExtractor {
        PageExtractor::new(FormatResolver::new(["IMAX", "RPX", "4DX"]), ORIGIN).unwrap()
    }

    fn ctx() -> PageContext<'static> {
        PageContext {
            theater: "Regal Union Square",
            date: NaiveDate::from_ymd_opt(2026, 2, 9).unwrap(),
        }
    }

    const LISTING: &str = r#"
<html><body>
  <span data-qa="address">850 Broadway
New York, NY 10003</span>
  <ul>
    <li data-qa="movie">
      <span class="sr-text">Heat</span>
      <div class="sc-1 DivMovieScores-abc">
        <span data-qa="certified_fresh-score">88%</span>
      </div>
      <section class="sc-2 showtime-options">
        <div class="DivVariantTitle-x">IMAX</div>
        <section class="AmenityGroup-1">
          <ul data-qa="AmenityList"><li><button>Reserved Seating</button></li></ul>
          <a class="AShowtime-q" href="/checkout/1"><span>7:00 PM</span></a>
          <a class="AShowtime-q" href="/checkout/2"><span>10:15 PM</span></a>
        </section>
      </section>
      <section class="sc-3 showtime-options">
        <div class="DivVariantTitle-x">Standard</div>
        <section class="AmenityGroup-2">
          <ul data-qa="AmenityList">
            <li><button>Reserved Seating</button></li>
            <li><button>RPX</button></li>
          </ul>
          <a class="AShowtime-q" href="/checkout/3"><span>1:00 PM</span></a>
        </section>
        <section class="AmenityGroup-3">
          <a class="AShowtime-q" href="/checkout/4"><span>4:00 PM</span></a>
        </section>
      </section>
    </li>
    <li data-qa="movie">
      <div class="DivMovieScores-abc"></div>
      <section class="showtime-options">
        <section class="AmenityGroup-1">
          <a class="AShowtime-q" href="/checkout/9"><span>8:00 PM</span></a>
        </section>
      </section>
    </li>
    <li data-qa="movie">
      <span class="sr-text">Ronin</span>
      <div class="DivMovieScores-abc"><span data-qa="rotten-score">41%</span></div>
      <section class="showtime-options">
        <section class="AmenityGroup-1">
          <a class="AShowtime-q" href="/checkout/5"></a>
          <a class="AShowtime-q"><span>9:00 PM</span></a>
          <a class="AShowtime-q" href="https://other.example/buy/6"><span>11:00 PM</span></a>
        </section>
      </section>
    </li>
  </ul>
</body></html>
"#;

    #[test]
    fn extracts_showtimes_in_page_order() {
        let page = extractor().extract(LISTING, ctx());

        assert_eq!(page.movies, 3);
        let times: Vec<_> = page.showtimes.iter().map(|s| (s.movie.as_str(), s.time.as_str())).collect();
        assert_eq!(
            times,
            vec![
                ("Heat", "7:00 PM"),
                ("Heat", "10:15 PM"),
                ("Heat", "1:00 PM"),
                ("Heat", "4:00 PM"),
                ("Ronin", "11:00 PM"),
            ]
        );
    }

    #[test]
    fn fills_every_field() {
        let page = extractor().extract(LISTING, ctx());
        let first = &page.showtimes[0];

        assert_eq!(first.theater, "Regal Union Square");
        assert_eq!(first.format, "IMAX");
        assert_eq!(first.amenities, vec!["Reserved Seating".to_string()]);
        assert_eq!(first.date, ctx().date);
        assert_eq!(first.rottentomatoes_score.as_deref(), Some("88%"));
        assert_eq!(first.url, "https://tickets.example/checkout/1");
        assert_eq!(
            first.id,
            showtime_id("Regal Union Square", "Heat", ctx().date, "7:00 PM")
        );
    }

    #[test]
    fn format_comes_from_label_then_amenities() {
        let page = extractor().extract(LISTING, ctx());
        let formats: Vec<_> = page.showtimes.iter().map(|s| s.format.as_str()).collect();
        assert_eq!(formats, vec!["IMAX", "IMAX", "RPX", "Standard", "Standard"]);
        assert!(page.showtimes[3].amenities.is_empty());
    }

    #[test]
    fn untitled_movie_is_skipped_without_blocking_siblings() {
        let page = extractor().extract(LISTING, ctx());
        assert!(page.showtimes.iter().all(|s| s.url != "https://tickets.example/checkout/9"));
        assert!(page.showtimes.iter().any(|s| s.movie == "Ronin"));
        assert!(page.skips.contains(&SkipReason::MissingTitle {
            theater: "Regal Union Square".to_string(),
            date: ctx().date,
        }));
    }

    #[test]
    fn broken_links_are_skipped_individually() {
        let page = extractor().extract(LISTING, ctx());
        let ronin: Vec<_> = page.showtimes.iter().filter(|s| s.movie == "Ronin").collect();
        assert_eq!(ronin.len(), 1);
        assert_eq!(ronin[0].url, "https://other.example/buy/6");
        assert_eq!(ronin[0].rottentomatoes_score.as_deref(), Some("41%"));

        let missing_time = page
            .skips
            .iter()
            .filter(|s| matches!(s, SkipReason::MissingTime { movie, .. } if movie == "Ronin"))
            .count();
        let missing_link = page
            .skips
            .iter()
            .filter(|s| matches!(s, SkipReason::MissingLink { movie, .. } if movie == "Ronin"))
            .count();
        assert_eq!((missing_time, missing_link), (1, 1));
    }

    #[test]
    fn empty_score_block_yields_no_score() {
        let html = r#"<li data-qa="movie"><span class="sr-text">Heat</span>
            <div class="DivMovieScores-1"><span data-qa="audience-score">90%</span></div>
            <section class="showtime-options"><section class="AmenityGroup-1">
              <a class="AShowtime-1" href="/c/1"><span>1:00 PM</span></a>
            </section></section></li>"#;
        let page = extractor().extract(html, ctx());
        assert_eq!(page.showtimes.len(), 1);
        assert_eq!(page.showtimes[0].rottentomatoes_score, None);
    }

    #[test]
    fn page_without_movies_is_empty_not_an_error() {
        let page = extractor().extract("<html><body><p>No showtimes</p></body></html>", ctx());
        assert_eq!(page.movies, 0);
        assert!(page.showtimes.is_empty());
        assert!(page.skips.is_empty());
    }

    #[test]
    fn duplicate_blocks_produce_duplicate_records() {
        let block = r#"<li data-qa="movie"><span class="sr-text">Heat</span>
            <section class="showtime-options"><section class="AmenityGroup-1">
              <a class="AShowtime-1" href="/c/1"><span>1:00 PM</span></a>
            </section></section></li>"#;
        let html = format!("<ul>{block}{block}</ul>");
        let page = extractor().extract(&html, ctx());
        assert_eq!(page.showtimes.len(), 2);
        assert_eq!(page.showtimes[0].id, page.showtimes[1].id);
    }

    #[test]
    fn address_folds_newlines() {
        let ex = extractor();
        assert_eq!(
            ex.extract_address(LISTING).as_deref(),
            Some("850 Broadway New York, NY 10003")
        );
        assert_eq!(ex.extract_address("<html></html>"), None);
    }
}
