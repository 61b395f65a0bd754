//! Small FITS helpers.

use std::{
    ffi::{CStr, CString},
    ptr,
};

use fitsio::{errors::check_status as fits_check_status, hdu::*, FitsFile};

use super::StoreError;

/// Open a fits file.
pub(crate) fn fits_open<P: AsRef<std::path::Path>>(file: P) -> Result<FitsFile, StoreError> {
    let file = file.as_ref();
    if !file.exists() {
        return Err(StoreError::NotFound(file.to_path_buf()));
    }
    Ok(FitsFile::open(file)?)
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword that may
/// or may not exist, pull out the value of the keyword, parsing it into the
/// desired type.
pub(crate) fn fits_get_optional_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &'static str,
) -> Result<Option<T>, StoreError> {
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(key_value) => key_value,
        Err(e) => match &e {
            // 202 = keyword not found, 204 = null value.
            fitsio::errors::Error::Fits(fe) if matches!(fe.status, 202 | 204) => {
                return Ok(None)
            }
            _ => return Err(e.into()),
        },
    };

    match unparsed_value.trim().parse() {
        Ok(parsed_value) => Ok(Some(parsed_value)),
        Err(_) => Err(StoreError::Parse {
            key: keyword,
            value: unparsed_value,
        }),
    }
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword, pull out
/// the value of the keyword, parsing it into the desired type.
pub(crate) fn fits_get_required_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    hdu_name: &'static str,
    keyword: &'static str,
) -> Result<T, StoreError> {
    fits_get_optional_key(fits_fptr, hdu, keyword)?.ok_or(StoreError::MissingKey {
        key: keyword,
        hdu: hdu_name,
    })
}

/// Given a FITS file pointer and a HDU, read the associated image.
pub(crate) fn fits_get_image<T: fitsio::images::ReadImage>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    hdu_name: &'static str,
) -> Result<T, StoreError> {
    match &hdu.info {
        HduInfo::ImageInfo { .. } => Ok(hdu.read_image(fits_fptr)?),
        _ => Err(StoreError::NotImage(hdu_name)),
    }
}

/// Write a string keyword that may be longer than a single header card,
/// using the CONTINUE convention.
pub(crate) fn fits_write_key_long_string(
    fits_fptr: &mut FitsFile,
    keyword: &str,
    value: &str,
) -> Result<(), StoreError> {
    // Interior NULs can't be represented; such values are skipped.
    let (keyword, value) = match (CString::new(keyword), CString::new(value)) {
        (Ok(k), Ok(v)) => (k, v),
        _ => return Ok(()),
    };
    let mut status = 0;
    unsafe {
        // ffplsw = fits_write_key_longwarn
        fitsio_sys::ffplsw(fits_fptr.as_raw(), &mut status);
        fits_check_status(status)?;
        // ffpkls = fits_write_key_longstr
        fitsio_sys::ffpkls(
            fits_fptr.as_raw(),
            keyword.as_ptr(),
            value.as_ptr(),
            ptr::null(),
            &mut status,
        );
        fits_check_status(status)?;
    }
    Ok(())
}

/// Given a FITS file pointer, and a keyword to a long string keyword that may
/// or may not exist, pull out the long string of the keyword. This deals with
/// FITSs CONTINUE mechanism by calling a low level fits function.
pub(crate) fn fits_get_optional_key_long_string(
    fits_fptr: &mut FitsFile,
    keyword: &'static str,
) -> Result<Option<String>, StoreError> {
    let keyword_ffi = match CString::new(keyword) {
        Ok(k) => k,
        Err(_) => return Ok(None),
    };
    unsafe {
        let mut status = 0;
        let mut long_string_ptr = ptr::null_mut();
        // ffgkls = fits_read_key_longstr
        fitsio_sys::ffgkls(
            fits_fptr.as_raw(),
            keyword_ffi.as_ptr(),
            &mut long_string_ptr,
            ptr::null_mut(),
            &mut status,
        );
        match status {
            0 => {
                let long_string = CStr::from_ptr(long_string_ptr).to_string_lossy().to_string();
                // Free the cfitsio-allocated string.
                // fffree = fits_free_memory
                fitsio_sys::fffree(long_string_ptr.cast(), &mut 0);
                Ok(Some(long_string))
            }
            202 | 204 => Ok(None),
            _ => {
                fits_check_status(status)?;
                Ok(None)
            }
        }
    }
}
