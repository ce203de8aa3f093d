//! LU factorization and solve, used by the dense reference solver in
//! general-symmetry mode

use super::*;
use crate::error::*;

pub type Pivot = Vec<i32>;

pub trait Lu_: Scalar {
    /// Wrapper of `*getrf`
    fn getrf(n: i32, a: &mut [Self], lda: i32) -> Result<Pivot>;

    /// Wrapper of `*getrs`
    fn getrs(
        trans: Transpose,
        n: i32,
        nrhs: i32,
        a: &[Self],
        lda: i32,
        ipiv: &Pivot,
        b: &mut [Self],
        ldb: i32,
    ) -> Result<()>;
}

macro_rules! impl_lu {
    ($scalar:ty, $trf:path, $trs:path) => {
        impl Lu_ for $scalar {
            fn getrf(n: i32, a: &mut [Self], lda: i32) -> Result<Pivot> {
                let mut ipiv = vec![0; n as usize];
                let mut info = 0;
                unsafe {
                    $trf(n, n, a, lda, &mut ipiv, &mut info);
                }
                lapack_result("getrf", info)?;
                Ok(ipiv)
            }

            fn getrs(
                trans: Transpose,
                n: i32,
                nrhs: i32,
                a: &[Self],
                lda: i32,
                ipiv: &Pivot,
                b: &mut [Self],
                ldb: i32,
            ) -> Result<()> {
                let mut info = 0;
                unsafe {
                    $trs(trans as u8, n, nrhs, a, lda, ipiv, b, ldb, &mut info);
                }
                lapack_result("getrs", info)
            }
        }
    };
}

impl_lu!(f64, lapack::dgetrf, lapack::dgetrs);
impl_lu!(f32, lapack::sgetrf, lapack::sgetrs);
impl_lu!(c64, lapack::zgetrf, lapack::zgetrs);
impl_lu!(c32, lapack::cgetrf, lapack::cgetrs);
