use crate::de::{Reader, Token};
use crate::error::{ErrorKind, Result};
use crate::ser::Writer;
use crate::value::{CreateFn, JsonValue};
use std::collections::{BTreeSet, HashSet, LinkedList, VecDeque};
use std::hash::Hash;

/// Read-side adapter over anything with sequence semantics. `add` consumes
/// one element token, `end` runs once the closing bracket is seen.
pub trait ArraySink {
    fn add(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()>;

    fn end(&mut self, _reader: &mut Reader<'_>) -> Result<()> {
        Ok(())
    }
}

struct VecSink<'c, V> {
    items: &'c mut Vec<V>,
}

impl<V: JsonValue> ArraySink for VecSink<'_, V> {
    fn add(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.items.push(V::read_new(reader, creator, token)?);
        Ok(())
    }

    fn end(&mut self, _reader: &mut Reader<'_>) -> Result<()> {
        self.items.shrink_to_fit();
        Ok(())
    }
}

struct DequeSink<'c, V> {
    items: &'c mut VecDeque<V>,
}

impl<V: JsonValue> ArraySink for DequeSink<'_, V> {
    fn add(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.items.push_back(V::read_new(reader, creator, token)?);
        Ok(())
    }
}

struct ListSink<'c, V> {
    items: &'c mut LinkedList<V>,
}

impl<V: JsonValue> ArraySink for ListSink<'_, V> {
    fn add(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.items.push_back(V::read_new(reader, creator, token)?);
        Ok(())
    }
}

struct HashSetSink<'c, V> {
    items: &'c mut HashSet<V>,
}

impl<V: JsonValue + Eq + Hash> ArraySink for HashSetSink<'_, V> {
    fn add(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.items.insert(V::read_new(reader, creator, token)?);
        Ok(())
    }
}

struct BTreeSetSink<'c, V> {
    items: &'c mut BTreeSet<V>,
}

impl<V: JsonValue + Ord> ArraySink for BTreeSetSink<'_, V> {
    fn add(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.items.insert(V::read_new(reader, creator, token)?);
        Ok(())
    }
}

/// Fixed-size storage: overflow is `CantAddToArray`, untouched tail elements
/// keep their prior values.
struct SliceSink<'c, V> {
    items: &'c mut [V],
    index: usize,
}

impl<V: JsonValue> ArraySink for SliceSink<'_, V> {
    fn add(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        if self.index >= self.items.len() {
            return Err(reader.fail(ErrorKind::CantAddToArray, ""));
        }
        self.items[self.index].read(reader, creator, token)?;
        self.index += 1;
        Ok(())
    }
}

impl<V: JsonValue> JsonValue for Vec<V> {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.clear();
        reader.read_array(&mut VecSink { items: self }, creator, token)
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let mut items = Vec::new();
        reader.read_array(&mut VecSink { items: &mut items }, creator, token)?;
        Ok(items)
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_seq(self)
    }
}

impl<V: JsonValue> JsonValue for VecDeque<V> {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.clear();
        reader.read_array(&mut DequeSink { items: self }, creator, token)
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let mut items = VecDeque::new();
        reader.read_array(&mut DequeSink { items: &mut items }, creator, token)?;
        Ok(items)
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_seq(self)
    }
}

impl<V: JsonValue> JsonValue for LinkedList<V> {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.clear();
        reader.read_array(&mut ListSink { items: self }, creator, token)
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let mut items = LinkedList::new();
        reader.read_array(&mut ListSink { items: &mut items }, creator, token)?;
        Ok(items)
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_seq(self)
    }
}

impl<V: JsonValue + Eq + Hash> JsonValue for HashSet<V> {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.clear();
        reader.read_array(&mut HashSetSink { items: self }, creator, token)
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let mut items = HashSet::new();
        reader.read_array(&mut HashSetSink { items: &mut items }, creator, token)?;
        Ok(items)
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_seq(self)
    }
}

impl<V: JsonValue + Ord> JsonValue for BTreeSet<V> {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        self.clear();
        reader.read_array(&mut BTreeSetSink { items: self }, creator, token)
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let mut items = BTreeSet::new();
        reader.read_array(&mut BTreeSetSink { items: &mut items }, creator, token)?;
        Ok(items)
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_seq(self)
    }
}

impl<V: JsonValue + Default, const N: usize> JsonValue for [V; N] {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        let mut sink = SliceSink {
            items: self,
            index: 0,
        };
        reader.read_array(&mut sink, creator, token)
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let mut items: [V; N] = std::array::from_fn(|_| V::default());
        JsonValue::read(&mut items, reader, creator, token)?;
        Ok(items)
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_seq(self)
    }
}
