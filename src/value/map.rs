use crate::de::{Reader, Token};
use crate::error::Result;
use crate::ser::Writer;
use crate::value::{CreateFn, JsonValue};
use std::collections::{BTreeMap, HashMap};

// String-keyed maps read as JSON objects with arbitrary keys, outside the
// class protocol: no @class/@id, keys merge into the target and overwrite.

impl<V: JsonValue> JsonValue for HashMap<String, V> {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        reader.read_map(token, creator, &mut |reader, key, value, creator| {
            let value = V::read_new(reader, creator, value)?;
            self.insert(key.to_owned(), value);
            Ok(())
        })
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let mut map = HashMap::new();
        JsonValue::read(&mut map, reader, creator, token)?;
        Ok(map)
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_map(self)
    }
}

impl<V: JsonValue> JsonValue for BTreeMap<String, V> {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        reader.read_map(token, creator, &mut |reader, key, value, creator| {
            let value = V::read_new(reader, creator, value)?;
            self.insert(key.to_owned(), value);
            Ok(())
        })
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        JsonValue::read(&mut map, reader, creator, token)?;
        Ok(map)
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_map(self)
    }
}
