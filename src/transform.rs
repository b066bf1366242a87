use crate::error::{BuildError, ElementError, HandlerError};

/// 2-D affine matrix in SVG order:
///
/// ```text
/// | a c e |
/// | b d f |
/// | 0 0 1 |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::identity()
        }
    }

    pub fn mul(self, other: Self) -> Self {
        // [self] * [other]
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn determinant(self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    /// Uniform scale that preserves area: sqrt(|det|).
    pub fn scale_factor(self) -> f32 {
        libm::sqrtf(self.determinant().abs())
    }

    pub fn is_identity(self) -> bool {
        self == Self::identity()
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

const UNSUPPORTED_FUNCTIONS: [&str; 5] = ["translate", "scale", "rotate", "skewX", "skewY"];

/// Parses a `transform`/`gradientTransform` value. Only `matrix(...)` is accepted;
/// the other SVG transform functions are a fatal error. When several matrices are
/// listed the last one wins.
pub(crate) fn parse_transform(
    element: &str,
    attribute: &str,
    input: &str,
) -> Result<Option<Matrix>, HandlerError> {
    let malformed = || ElementError::InvalidNumber {
        element: element.to_string(),
        attribute: attribute.to_string(),
        value: input.to_string(),
    };

    let mut out = None;
    let mut s = input.trim();
    while !s.is_empty() {
        let Some(open) = s.find('(') else {
            return Err(malformed().into());
        };
        let name = s[..open].trim_matches(|c: char| c.is_whitespace() || c == ',');
        let Some(close) = s[open + 1..].find(')') else {
            return Err(malformed().into());
        };
        let args = &s[open + 1..open + 1 + close];

        if UNSUPPORTED_FUNCTIONS.contains(&name) {
            return Err(BuildError::UnsupportedTransform(format!("{}({})", name, args.trim())).into());
        }
        if name != "matrix" {
            return Err(malformed().into());
        }

        let values: Vec<f32> = args
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<f32>())
            .collect::<Result<_, _>>()
            .map_err(|_| malformed())?;
        let &[a, b, c, d, e, f] = values.as_slice() else {
            return Err(malformed().into());
        };
        out = Some(Matrix { a, b, c, d, e, f });

        s = s[open + 1 + close + 1..].trim_start();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_with_commas_translates() {
        let m = parse_transform("rect", "transform", "matrix(1,0,0,1,10,0)")
            .unwrap()
            .unwrap();
        assert_eq!(m.apply(0.0, 0.0), (10.0, 0.0));
        assert_eq!(m.apply(5.0, 5.0), (15.0, 5.0));
    }

    #[test]
    fn matrix_with_spaces() {
        let m = parse_transform("g", "transform", "matrix(2 0 0 2 1 1)")
            .unwrap()
            .unwrap();
        assert_eq!(m, Matrix::new(2.0, 0.0, 0.0, 2.0, 1.0, 1.0));
    }

    #[test]
    fn translate_is_fatal() {
        let err = parse_transform("rect", "transform", "translate(10,0)").unwrap_err();
        match err {
            HandlerError::Fatal(BuildError::UnsupportedTransform(f)) => {
                assert_eq!(f, "translate(10,0)")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn every_listed_function_is_rejected() {
        for value in ["scale(2)", "rotate(45)", "skewX(10)", "skewY(10)"] {
            let err = parse_transform("path", "transform", value).unwrap_err();
            assert!(matches!(
                err,
                HandlerError::Fatal(BuildError::UnsupportedTransform(_))
            ));
        }
    }

    #[test]
    fn unsupported_after_matrix_still_fails() {
        let err = parse_transform("g", "transform", "matrix(1 0 0 1 0 0) rotate(5)").unwrap_err();
        assert!(matches!(err, HandlerError::Fatal(_)));
    }

    #[test]
    fn last_matrix_wins() {
        let m = parse_transform(
            "g",
            "transform",
            "matrix(1 0 0 1 5 5) matrix(1 0 0 1 7 8)",
        )
        .unwrap()
        .unwrap();
        assert_eq!(m.apply(0.0, 0.0), (7.0, 8.0));
    }

    #[test]
    fn short_matrix_is_an_element_error() {
        let err = parse_transform("rect", "transform", "matrix(1 0 0)").unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Element(ElementError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn composition_matches_sequential_application() {
        let a = Matrix::new(2.0, 0.0, 0.0, 3.0, 0.0, 0.0);
        let b = Matrix::translate(1.0, 1.0);
        let (x, y) = a.mul(b).apply(1.0, 1.0);
        let (bx, by) = b.apply(1.0, 1.0);
        assert_eq!((x, y), a.apply(bx, by));
        assert!((a.scale_factor() - 6.0f32.sqrt()).abs() < 1e-6);
    }
}
