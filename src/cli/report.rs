//! Human-readable report output.

use crate::gc::{Classification, RetentionPlan};
use crate::models::{DeleteImagesResult, Image, short_digest};
use crate::{Error, Result};
use std::io::Write;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn write_error(e: std::io::Error) -> Error {
    Error::operation("write_report", e)
}

/// Writes the inventory header line.
pub fn write_inventory_header<W: Write + ?Sized>(
    out: &mut W,
    repository: &str,
    region: Option<&str>,
    total: usize,
) -> Result<()> {
    let written = match region {
        Some(region) => writeln!(out, "Total images in {repository} ({region}): {total}"),
        None => writeln!(out, "Total images in {repository}: {total}"),
    };
    written.map_err(write_error)
}

/// Writes a heading followed by one line per image.
pub fn write_images<'a, W, I>(out: &mut W, heading: &str, images: I) -> Result<()>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = &'a Image>,
{
    let images: Vec<&Image> = images.into_iter().collect();
    writeln!(out, "{heading} ({})", images.len()).map_err(write_error)?;
    for image in images {
        writeln!(
            out,
            "  {}: {}... [{}]",
            image.pushed_at.format(TIMESTAMP_FORMAT),
            image.short_digest(),
            image.tags.join(", ")
        )
        .map_err(write_error)?;
    }
    Ok(())
}

/// Writes the retained-image breakdown by classification.
pub fn write_retained_summary<W: Write + ?Sized>(out: &mut W, plan: &RetentionPlan) -> Result<()> {
    let retained = plan.len() - plan.deletion_count();
    let kept_untagged = plan
        .decisions()
        .iter()
        .filter(|d| d.classification == Classification::Untagged && !d.delete)
        .count();
    writeln!(
        out,
        "Retained ({retained}): recent={} unmanaged={} unmatched={} untagged={kept_untagged}",
        plan.count(Classification::Recent),
        plan.count(Classification::Unmanaged),
        plan.count(Classification::Unmatched),
    )
    .map_err(write_error)
}

/// Writes the deletion outcome.
pub fn write_result<W: Write + ?Sized>(out: &mut W, result: &DeleteImagesResult) -> Result<()> {
    writeln!(out, "Deleted ({})", result.deletions.len()).map_err(write_error)?;
    for id in &result.deletions {
        writeln!(
            out,
            "  {}... ({})",
            short_digest(&id.digest),
            id.tag.as_deref().unwrap_or("untagged")
        )
        .map_err(write_error)?;
    }

    writeln!(out, "Failures ({})", result.failures.len()).map_err(write_error)?;
    for failure in &result.failures {
        writeln!(
            out,
            "  {}... {}: {}",
            short_digest(&failure.id.digest),
            failure.code,
            failure.reason
        )
        .map_err(write_error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::{RetentionPolicy, plan};
    use crate::models::{ImageFailure, ImageId};
    use chrono::{TimeZone, Utc};

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn test_inventory_header() {
        let with_region = render(|out| write_inventory_header(out, "web", Some("us-east-1"), 3));
        assert_eq!(with_region, "Total images in web (us-east-1): 3\n");

        let without = render(|out| write_inventory_header(out, "web", None, 0));
        assert_eq!(without, "Total images in web: 0\n");
    }

    #[test]
    fn test_write_images_format() {
        let pushed = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 5)
            .single()
            .expect("valid time");
        let images = vec![Image::new(
            "sha256:0123456789abcdef",
            pushed,
            ["release-1", "stable"],
        )];

        let text = render(|out| write_images(out, "Images to delete", &images));
        assert_eq!(
            text,
            "Images to delete (1)\n  2024-03-01 12:30:05: sha256:012345678... [release-1, stable]\n"
        );
    }

    #[test]
    fn test_write_result_format() {
        let result = DeleteImagesResult {
            deletions: vec![ImageId::from_digest("sha256:aaaa").with_tag("v1")],
            failures: vec![ImageFailure::new(
                ImageId::from_digest("sha256:bbbb"),
                "ImageNotFound",
                "Requested image not found",
            )],
        };

        let text = render(|out| write_result(out, &result));
        assert_eq!(
            text,
            "Deleted (1)\n  sha256:aaaa... (v1)\nFailures (1)\n  sha256:bbbb... ImageNotFound: Requested image not found\n"
        );
    }

    #[test]
    fn test_retained_summary() {
        let now = Utc::now();
        let images = vec![
            Image::new("a", now, ["foo-1"]),
            Image::new("b", now, ["bar"]),
            Image::new("c", now, Vec::<String>::new()),
        ];
        let plan = plan(&images, &RetentionPolicy::new().with_keep("foo", 1));

        let text = render(|out| write_retained_summary(out, &plan));
        assert_eq!(
            text,
            "Retained (3): recent=1 unmanaged=1 unmatched=0 untagged=1\n"
        );
    }
}
