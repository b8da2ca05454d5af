use crate::archive::{ARCHIVE_SIGNATURE, MAX_MEMBER_NAME_LEN, MEMBER_HEADER_SIZE};
use crate::error::{Error, Result};

/// Rewrites every object member's name field in an existing library to
/// `new_name`, in place. The two linker members and the longnames member keep
/// their names, and the symbol maps inside the linker members are left as
/// they are. Returns how many members were renamed.
pub fn rename_implib_objects(data: &mut [u8], new_name: &str) -> Result<usize> {
    if new_name.len() > MAX_MEMBER_NAME_LEN {
        return Err(Error::BadName(new_name.to_string()));
    }
    if data.len() < ARCHIVE_SIGNATURE.len() || !data.starts_with(ARCHIVE_SIGNATURE) {
        return Err(Error::BadInput("not an archive".to_string()));
    }

    let header_size = MEMBER_HEADER_SIZE as usize;
    let mut pos = ARCHIVE_SIGNATURE.len();
    let mut renamed = 0;
    while pos + header_size <= data.len() {
        let header = &data[pos..pos + header_size];
        if &header[58..60] != b"`\n" {
            return Err(Error::BadInput("corrupt member header".to_string()));
        }
        let size_field = std::str::from_utf8(&header[48..58])
            .map_err(|_| Error::BadInput("corrupt member size".to_string()))?;
        let size: usize = size_field
            .trim_end()
            .parse()
            .map_err(|_| Error::BadInput("corrupt member size".to_string()))?;

        // Names starting with '/' belong to the directory members.
        if header[0] != b'/' {
            let mut field = [b' '; 16];
            field[..new_name.len()].copy_from_slice(new_name.as_bytes());
            field[new_name.len()] = b'/';
            data[pos..pos + 16].copy_from_slice(&field);
            renamed += 1;
        }

        pos = pos
            .checked_add(header_size + size + size % 2)
            .ok_or_else(|| Error::BadInput("corrupt member size".to_string()))?;
    }
    Ok(renamed)
}
