//! Selected eigenvalues of a symmetric tridiagonal matrix by bisection,
//! and the matching eigenvectors by inverse iteration

use super::*;
use crate::error::*;
use num_traits::Zero;

pub trait Tridiagonal_: Scalar {
    /// Wrapper of `dstebz`/`sstebz`.
    ///
    /// Returns the number of eigenvalues found and the number of diagonal
    /// blocks; the eigenvalues land in `w`, their block assignment in
    /// `iblock`/`isplit` in the layout `stein` expects (`Order::Block`).
    #[allow(clippy::too_many_arguments)]
    fn stebz(
        range: Range,
        order: Order,
        n: i32,
        vl: Self::Real,
        vu: Self::Real,
        il: i32,
        iu: i32,
        abstol: Self::Real,
        d: &[Self::Real],
        e: &[Self::Real],
        w: &mut [Self::Real],
        iblock: &mut [i32],
        isplit: &mut [i32],
    ) -> Result<(i32, i32)>;

    /// Wrapper of `*stein`: eigenvectors for the `m` eigenvalues selected
    /// by [`Tridiagonal_::stebz`], written column-major into `z`.
    #[allow(clippy::too_many_arguments)]
    fn stein(
        n: i32,
        d: &[Self::Real],
        e: &[Self::Real],
        m: i32,
        w: &[Self::Real],
        iblock: &[i32],
        isplit: &[i32],
        z: &mut [Self],
        ldz: i32,
    ) -> Result<()>;
}

macro_rules! impl_tridiagonal {
    ($scalar:ty, $stebz:path, $stein:path) => {
        impl Tridiagonal_ for $scalar {
            fn stebz(
                range: Range,
                order: Order,
                n: i32,
                vl: Self::Real,
                vu: Self::Real,
                il: i32,
                iu: i32,
                abstol: Self::Real,
                d: &[Self::Real],
                e: &[Self::Real],
                w: &mut [Self::Real],
                iblock: &mut [i32],
                isplit: &mut [i32],
            ) -> Result<(i32, i32)> {
                let mut m = 0;
                let mut nsplit = [0];
                let mut work = vec![Self::Real::zero(); 4 * n as usize];
                let mut iwork = vec![0; 3 * n as usize];
                let mut info = 0;
                unsafe {
                    $stebz(
                        range as u8,
                        order as u8,
                        n,
                        vl,
                        vu,
                        il,
                        iu,
                        abstol,
                        d,
                        e,
                        &mut m,
                        &mut nsplit,
                        w,
                        iblock,
                        isplit,
                        &mut work,
                        &mut iwork,
                        &mut info,
                    );
                }
                lapack_result("stebz", info)?;
                Ok((m, nsplit[0]))
            }

            fn stein(
                n: i32,
                d: &[Self::Real],
                e: &[Self::Real],
                m: i32,
                w: &[Self::Real],
                iblock: &[i32],
                isplit: &[i32],
                z: &mut [Self],
                ldz: i32,
            ) -> Result<()> {
                let mut work = vec![Self::Real::zero(); 5 * n as usize];
                let mut iwork = vec![0; n as usize];
                let mut ifailv = vec![0; m as usize];
                let mut info = 0;
                unsafe {
                    $stein(
                        n,
                        d,
                        e,
                        m,
                        w,
                        iblock,
                        isplit,
                        z,
                        ldz,
                        &mut work,
                        &mut iwork,
                        &mut ifailv,
                        &mut info,
                    );
                }
                lapack_result("stein", info)
            }
        }
    };
}

impl_tridiagonal!(f64, lapack::dstebz, lapack::dstein);
impl_tridiagonal!(f32, lapack::sstebz, lapack::sstein);
impl_tridiagonal!(c64, lapack::dstebz, lapack::zstein);
impl_tridiagonal!(c32, lapack::sstebz, lapack::cstein);
