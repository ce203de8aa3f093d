//! Solve against a triangular factor

use super::*;
use crate::error::*;

/// Wraps `*trtrs`
pub trait Triangular_: Scalar {
    fn trtrs(
        uplo: UPLO,
        trans: Transpose,
        diag: Diag,
        n: i32,
        nrhs: i32,
        a: &[Self],
        lda: i32,
        b: &mut [Self],
        ldb: i32,
    ) -> Result<()>;
}

macro_rules! impl_triangular {
    ($scalar:ty, $trtrs:path) => {
        impl Triangular_ for $scalar {
            fn trtrs(
                uplo: UPLO,
                trans: Transpose,
                diag: Diag,
                n: i32,
                nrhs: i32,
                a: &[Self],
                lda: i32,
                b: &mut [Self],
                ldb: i32,
            ) -> Result<()> {
                let mut info = 0;
                unsafe {
                    $trtrs(
                        uplo as u8,
                        trans as u8,
                        diag as u8,
                        n,
                        nrhs,
                        a,
                        lda,
                        b,
                        ldb,
                        &mut info,
                    );
                }
                lapack_result("trtrs", info)
            }
        }
    };
}

impl_triangular!(f64, lapack::dtrtrs);
impl_triangular!(f32, lapack::strtrs);
impl_triangular!(c64, lapack::ztrtrs);
impl_triangular!(c32, lapack::ctrtrs);
