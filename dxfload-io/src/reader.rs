//! 行读取与组码解析。

use std::io::BufRead;
use std::str::FromStr;

use tracing::warn;

use crate::ImportError;

/// 按行读取字节流：去掉换行与回车，非 UTF-8 字节按替换字符解码，并统计行数。
pub struct LineReader<R> {
    inner: R,
    buffer: Vec<u8>,
    line_count: usize,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            line_count: 0,
        }
    }

    /// 已读取的行数。
    #[inline]
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn next_line(&mut self) -> Result<Option<String>, ImportError> {
        self.buffer.clear();
        let read = self
            .inner
            .read_until(b'\n', &mut self.buffer)
            .map_err(|source| ImportError::Read {
                line: self.line_count + 1,
                source,
            })?;
        if read == 0 {
            return Ok(None);
        }
        self.line_count += 1;
        self.buffer.retain(|&b| b != b'\n' && b != b'\r');
        Ok(Some(String::from_utf8_lossy(&self.buffer).into_owned()))
    }

    /// 读取一对（组码, 值）。输入在组码行之前结束时返回 `None`。
    pub fn next_pair(&mut self) -> Result<Option<(i32, String)>, ImportError> {
        let Some(code_line) = self.next_line()? else {
            return Ok(None);
        };
        let code = parse_group_code(&code_line).ok_or_else(|| {
            ImportError::structure(
                self.line_count,
                format!("组码 \"{}\" 不是合法的整数", code_line.trim()),
            )
        })?;
        let value = self.next_line()?.ok_or_else(|| {
            ImportError::structure(
                self.line_count,
                format!("组码 {code} 之后缺少值行"),
            )
        })?;
        Ok(Some((code, value)))
    }
}

/// 组码行去掉前导空白后必须非空且全部为 ASCII 数字。
pub fn parse_group_code(raw: &str) -> Option<i32> {
    let digits = raw.trim_start();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// 解析数值属性；失败时记录警告并忽略该值。
pub(crate) fn parse_value<T: FromStr>(raw: &str, code: i32, line: usize) -> Option<T> {
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(line, code, value = raw, "数值无法解析，已忽略");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn group_codes_allow_leading_whitespace_only() {
        assert_eq!(parse_group_code("  0"), Some(0));
        assert_eq!(parse_group_code("1001"), Some(1001));
        assert_eq!(parse_group_code(""), None);
        assert_eq!(parse_group_code("   "), None);
        assert_eq!(parse_group_code("-1"), None);
        assert_eq!(parse_group_code("10 "), None);
        assert_eq!(parse_group_code("1x"), None);
        assert_eq!(parse_group_code("99999999999"), None);
    }

    #[test]
    fn lines_strip_carriage_returns_and_decode_lossily() {
        let bytes = b"  0\r\nSECTION\r\n  2\nCAF\xE9\n".to_vec();
        let mut reader = LineReader::new(Cursor::new(bytes));
        assert_eq!(reader.next_pair().unwrap(), Some((0, "SECTION".to_string())));
        let (code, value) = reader.next_pair().unwrap().unwrap();
        assert_eq!(code, 2);
        assert_eq!(value, "CAF\u{FFFD}");
        assert_eq!(reader.next_pair().unwrap(), None);
        assert_eq!(reader.line_count(), 4);
    }

    #[test]
    fn dangling_code_is_structural_error() {
        let mut reader = LineReader::new(Cursor::new("  0\nEOF\n  8\n"));
        reader.next_pair().unwrap();
        match reader.next_pair() {
            Err(ImportError::Structure { line, .. }) => assert_eq!(line, 3),
            other => panic!("期望结构错误，实际 {other:?}"),
        }
    }

    #[test]
    fn bad_number_is_ignored() {
        assert_eq!(parse_value::<f64>(" 1.5 ", 10, 1), Some(1.5));
        assert_eq!(parse_value::<f64>("abc", 10, 1), None);
        assert_eq!(parse_value::<i32>("3.0", 70, 1), None);
    }
}
