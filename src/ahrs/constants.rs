use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{EfisError, Result, SyntaxError};

/// Tunables for the attitude filter, read from a `name value` text file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AhrsConstants {
    /// Largest drift correction rate, rad/s per rad of error
    pub noise_constant: f64,
    /// Apparent roll per m/s^2 of lateral acceleration
    pub yaw_roll_constant: f64,
}

impl AhrsConstants {
    /// Read a tunables file over the current values.
    ///
    /// Failing to open the file is an error. Bad lines are not: the first one
    /// is returned as a [`SyntaxError`] and every valid line is still applied.
    pub fn load(&mut self, path: &Path) -> Result<Option<SyntaxError>> {
        let text = fs::read_to_string(path).map_err(|e| EfisError::NoSuchFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(self.apply(&text))
    }

    pub fn apply(&mut self, text: &str) -> Option<SyntaxError> {
        let mut first_error = None;
        for (index, raw) in text.lines().enumerate() {
            if let Err(err) = self.apply_line(index + 1, raw) {
                log::warn!("ahrs constants: {}", err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        first_error
    }

    fn apply_line(&mut self, line: usize, raw: &str) -> std::result::Result<(), SyntaxError> {
        let content = raw.split('#').next().unwrap_or("");
        let name_start = content.len() - content.trim_start().len();
        let Some(name) = content.split_whitespace().next() else {
            return Ok(());
        };

        let rest = &content[name_start + name.len()..];
        let value_column = name_start + name.len() + (rest.len() - rest.trim_start().len()) + 1;
        let value = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite());

        let slot = match name {
            "noise_constant" => &mut self.noise_constant,
            "yaw_roll_constant" => &mut self.yaw_roll_constant,
            _ => {
                return Err(SyntaxError::new(
                    line,
                    name_start + 1,
                    format!("Unknown constant {}", name),
                ))
            }
        };
        match value {
            Some(v) => {
                *slot = v;
                Ok(())
            }
            None => Err(SyntaxError::new(line, value_column, "Expected numeric value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_constants() {
        let mut c = AhrsConstants::default();
        let err = c.apply("noise_constant 0.25\nyaw_roll_constant -0.02\n");
        assert!(err.is_none());
        assert_eq!(c.noise_constant, 0.25);
        assert_eq!(c.yaw_roll_constant, -0.02);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let mut c = AhrsConstants::default();
        let err = c.apply("# tuned on the ground\n\n  noise_constant   0.1  # conservative\n");
        assert!(err.is_none());
        assert_eq!(c.noise_constant, 0.1);
    }

    #[test]
    fn test_unknown_name_does_not_abort() {
        let mut c = AhrsConstants::default();
        let err = c
            .apply("noise_constant 0.3\nroll_gain 5\nyaw_roll_constant 0.01\n")
            .unwrap();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 1);
        assert!(err.message.starts_with("Unknown constant"));
        // Lines after the bad one are still read
        assert_eq!(c.noise_constant, 0.3);
        assert_eq!(c.yaw_roll_constant, 0.01);
    }

    #[test]
    fn test_bad_value_reports_value_column() {
        let mut c = AhrsConstants::default();
        let err = c.apply("noise_constant fast\n").unwrap();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 16);
        assert_eq!(err.message, "Expected numeric value");
        assert_eq!(c.noise_constant, 0.0);

        let err = c.apply("\n  yaw_roll_constant\n").unwrap();
        assert_eq!((err.line, err.column), (2, 20));
    }

    #[test]
    fn test_first_error_is_reported() {
        let mut c = AhrsConstants::default();
        let err = c.apply("a 1\nb 2\n").unwrap();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let mut c = AhrsConstants::default();
        let result = c.load(Path::new("/nonexistent/ahrs_constants"));
        assert!(matches!(result, Err(EfisError::NoSuchFile { .. })));
    }
}
