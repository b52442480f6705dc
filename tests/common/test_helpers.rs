/// File content helpers for checking what a backend left on an image
use std::fs;
use std::io::Read;
use std::path::Path;

/// Verify that a file contains only `byte`
pub fn verify_fill(path: &Path, byte: u8) -> std::io::Result<bool> {
    let mut file = fs::File::open(path)?;
    let mut buffer = vec![0u8; 4096];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        if buffer[..bytes_read].iter().any(|&b| b != byte) {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Calculate Shannon entropy of a file, in bits per byte
pub fn calculate_file_entropy(path: &Path) -> std::io::Result<f64> {
    let buffer = fs::read(path)?;
    if buffer.is_empty() {
        return Ok(0.0);
    }

    let mut counts = [0u64; 256];
    for &byte in &buffer {
        counts[byte as usize] += 1;
    }

    let length = buffer.len() as f64;
    Ok(counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / length;
            -p * p.log2()
        })
        .sum())
}

/// Number of entries in a directory; 0 if it does not exist
pub fn file_count(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_verify_fill() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0xFFu8; 1024]).unwrap();
        temp.flush().unwrap();

        assert!(verify_fill(temp.path(), 0xFF).unwrap());
        assert!(!verify_fill(temp.path(), 0x00).unwrap());
    }

    #[test]
    fn test_calculate_file_entropy() {
        let mut temp = NamedTempFile::new().unwrap();
        // All zeros should have near-zero entropy
        temp.write_all(&[0u8; 1000]).unwrap();
        temp.flush().unwrap();

        let entropy = calculate_file_entropy(temp.path()).unwrap();
        assert!(entropy < 0.1);
    }
}
