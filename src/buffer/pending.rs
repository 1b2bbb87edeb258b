//! 未確定の1バイト編集バッファ
//!
//! キー入力ごとに Range を作らないよう、連続した1バイト編集をここに溜める。
//! 挿入モードでは `origin` 以降の論理位置が `len()` だけ後ろにずれる。

/// 未確定編集のモード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingMode {
    Insert,
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdits {
    origin: u64,
    bytes: Vec<u8>,
    mode: PendingMode,
}

impl PendingEdits {
    pub fn insert(origin: u64, byte: u8) -> Self {
        Self {
            origin,
            bytes: vec![byte],
            mode: PendingMode::Insert,
        }
    }

    pub fn overwrite(origin: u64, byte: u8) -> Self {
        Self {
            origin,
            bytes: vec![byte],
            mode: PendingMode::Overwrite,
        }
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn end(&self) -> u64 {
        self.origin + self.len()
    }

    pub fn is_insert(&self) -> bool {
        self.mode == PendingMode::Insert
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 論理位置が未確定バイトの上にあるか
    pub fn contains(&self, position: u64) -> bool {
        self.origin <= position && position < self.end()
    }

    /// `origin` 以降の論理位置と Range 上の位置の差
    pub fn shift(&self) -> u64 {
        match self.mode {
            PendingMode::Insert => self.len(),
            PendingMode::Overwrite => 0,
        }
    }

    pub fn byte_at(&self, position: u64) -> Option<u8> {
        if !self.contains(position) {
            return None;
        }
        Some(self.bytes[(position - self.origin) as usize])
    }

    /// `position` から `dst` へコピーし、コピーしたバイト数を返す
    pub fn copy_to(&self, position: u64, dst: &mut [u8]) -> usize {
        if !self.contains(position) {
            return 0;
        }
        let start = (position - self.origin) as usize;
        let count = dst.len().min(self.bytes.len() - start);
        dst[..count].copy_from_slice(&self.bytes[start..start + count]);
        count
    }

    /// 挿入モードで連続していれば1バイト挿入する
    pub fn try_insert(&mut self, position: u64, byte: u8) -> bool {
        if !self.is_insert() || position < self.origin || position > self.end() {
            return false;
        }
        self.bytes.insert((position - self.origin) as usize, byte);
        true
    }

    /// 既存バイトの書き換え、または上書きモードでの前後への拡張
    pub fn try_overwrite(&mut self, position: u64, byte: u8) -> bool {
        if self.contains(position) {
            self.bytes[(position - self.origin) as usize] = byte;
            return true;
        }
        if self.is_insert() {
            return false;
        }
        if position + 1 == self.origin {
            self.bytes.insert(0, byte);
            self.origin = position;
            true
        } else if position == self.end() {
            self.bytes.push(byte);
            true
        } else {
            false
        }
    }

    /// 挿入モードで `[position, position + length)` が収まっていれば取り除く
    pub fn remove(&mut self, position: u64, length: u64) -> Option<Vec<u8>> {
        if !self.is_insert() || position < self.origin || position + length > self.end() {
            return None;
        }
        let start = (position - self.origin) as usize;
        Some(self.bytes.drain(start..start + length as usize).collect())
    }

    pub fn into_parts(self) -> (u64, Vec<u8>, PendingMode) {
        (self.origin, self.bytes, self.mode)
    }
}
