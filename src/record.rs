//! Text records at the pipeline edges.
//!
//! Input:  `<id>\t<f1>,<f2>,...`  or whitespace-delimited `<id> <f1> <f2> ...`
//! Output: `(<i>, <j>)\t<value>`

use crate::model::{AffinityResult, Point, PointId};
use crate::{Error, Result};

/// Parse one input record into a point.
///
/// Blank lines should be filtered by the caller; they are reported as
/// malformed here.
pub fn parse_record(line: &str) -> Result<Point> {
    let trimmed = line.trim();
    let (id_part, feature_part) = match trimmed.split_once('\t') {
        Some((id, rest)) => (id.trim(), rest.trim()),
        None => match trimmed.split_once(char::is_whitespace) {
            Some((id, rest)) => (id, rest.trim()),
            None => return Err(malformed(line, "missing feature vector")),
        },
    };

    let id: u64 = id_part
        .parse()
        .map_err(|_| malformed(line, format!("unparsable id {id_part:?}")))?;

    let features = parse_features(feature_part).map_err(|reason| malformed(line, reason))?;

    Ok(Point::new(PointId(id), features))
}

/// Parse a comma- or whitespace-delimited feature list.
pub fn parse_features(text: &str) -> std::result::Result<Vec<f64>, String> {
    let features = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|token| match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(_) => Err(format!("non-finite feature {token:?}")),
            Err(_) => Err(format!("non-numeric feature {token:?}")),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if features.is_empty() {
        return Err("empty feature vector".into());
    }
    Ok(features)
}

/// Render a result as an output record.
pub fn format_result(result: &AffinityResult) -> String {
    result.to_string()
}

fn malformed(line: &str, reason: impl Into<String>) -> Error {
    Error::MalformedRecord {
        line: line.to_string(),
        reason: reason.into(),
    }
}
