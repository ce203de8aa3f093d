//! Reduction of a generalized eigenproblem to standard form and of a
//! symmetric/Hermitian matrix to tridiagonal form

use super::*;
use crate::error::*;
use num_traits::{ToPrimitive, Zero};

pub trait Reduction_: Scalar {
    /// Wrapper of `*sygst`/`*hegst`: reduce `A x = lambda B x` to standard
    /// form given the Cholesky factor of B in `b`.
    fn gst(itype: i32, uplo: UPLO, n: i32, a: &mut [Self], b: &mut [Self]) -> Result<()>;

    /// Wrapper of `*sytrd`/`*hetrd`: tridiagonalize `a`, yielding the
    /// diagonal `d`, off-diagonal `e` and reflector scalars `tau`.
    fn trd(
        uplo: UPLO,
        n: i32,
        a: &mut [Self],
        lda: i32,
        d: &mut [Self::Real],
        e: &mut [Self::Real],
        tau: &mut [Self],
    ) -> Result<()>;

    /// Wrapper of `*ormtr`/`*unmtr`: multiply `c` by the orthogonal or
    /// unitary matrix accumulated by [`Reduction_::trd`].
    #[allow(clippy::too_many_arguments)]
    fn mtr(
        side: Side,
        uplo: UPLO,
        trans: Transpose,
        m: i32,
        n: i32,
        a: &[Self],
        lda: i32,
        tau: &[Self],
        c: &mut [Self],
        ldc: i32,
    ) -> Result<()>;
}

macro_rules! impl_reduction {
    ($scalar:ty, $gst:path, $trd:path, $mtr:path) => {
        impl Reduction_ for $scalar {
            fn gst(itype: i32, uplo: UPLO, n: i32, a: &mut [Self], b: &mut [Self]) -> Result<()> {
                let mut info = 0;
                unsafe {
                    $gst(&[itype], uplo as u8, n, a, n, b, n, &mut info);
                }
                lapack_result("gst", info)
            }

            fn trd(
                uplo: UPLO,
                n: i32,
                a: &mut [Self],
                lda: i32,
                d: &mut [Self::Real],
                e: &mut [Self::Real],
                tau: &mut [Self],
            ) -> Result<()> {
                let mut info = 0;
                let mut work_size = [Self::zero()];
                unsafe {
                    $trd(
                        uplo as u8,
                        n,
                        a,
                        lda,
                        d,
                        e,
                        tau,
                        &mut work_size,
                        -1,
                        &mut info,
                    );
                }
                lapack_result("trd", info)?;
                let lwork = work_size[0].to_usize().unwrap();
                let mut work = vec![Self::zero(); lwork];
                unsafe {
                    $trd(
                        uplo as u8,
                        n,
                        a,
                        lda,
                        d,
                        e,
                        tau,
                        &mut work,
                        lwork as i32,
                        &mut info,
                    );
                }
                lapack_result("trd", info)
            }

            fn mtr(
                side: Side,
                uplo: UPLO,
                trans: Transpose,
                m: i32,
                n: i32,
                a: &[Self],
                lda: i32,
                tau: &[Self],
                c: &mut [Self],
                ldc: i32,
            ) -> Result<()> {
                let mut info = 0;
                let mut work_size = [Self::zero()];
                unsafe {
                    $mtr(
                        side as u8,
                        uplo as u8,
                        trans as u8,
                        m,
                        n,
                        a,
                        lda,
                        tau,
                        c,
                        ldc,
                        &mut work_size,
                        -1,
                        &mut info,
                    );
                }
                lapack_result("mtr", info)?;
                let lwork = work_size[0].to_usize().unwrap();
                let mut work = vec![Self::zero(); lwork];
                unsafe {
                    $mtr(
                        side as u8,
                        uplo as u8,
                        trans as u8,
                        m,
                        n,
                        a,
                        lda,
                        tau,
                        c,
                        ldc,
                        &mut work,
                        lwork as i32,
                        &mut info,
                    );
                }
                lapack_result("mtr", info)
            }
        }
    };
}

impl_reduction!(f64, lapack::dsygst, lapack::dsytrd, lapack::dormtr);
impl_reduction!(f32, lapack::ssygst, lapack::ssytrd, lapack::sormtr);
impl_reduction!(c64, lapack::zhegst, lapack::zhetrd, lapack::zunmtr);
impl_reduction!(c32, lapack::chegst, lapack::chetrd, lapack::cunmtr);
