//! Arrow Flight client for the skiff document store.

use arrow_array::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{Action, FlightData, FlightDescriptor, IpcMessage, SchemaAsIpc, Ticket};
use arrow_ipc::writer::IpcWriteOptions;
use arrow_schema::Schema;
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{stream, StreamExt, TryStreamExt};
use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::debug;

use skiff_core::{unmarshal_record, Doc, DocSet, Registry};

use crate::error::{ClientError, ClientResult};

/// Action type for collection creation.
const CREATE_COLLECTION: &str = "create-collection";

/// Connection to one document store node.
///
/// All operations take `&mut self`; clone the client for concurrent use,
/// the underlying channel multiplexes.
#[derive(Debug, Clone)]
pub struct Client {
    flight: FlightServiceClient<Channel>,
}

impl Client {
    /// Connects eagerly, failing fast when the store is unreachable.
    ///
    /// # Errors
    ///
    /// [`ClientError::Connect`] on transport failure.
    pub async fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        let addr = addr.into();
        debug!(%addr, "connecting to document store");
        let flight = FlightServiceClient::connect(addr).await?;
        Ok(Self { flight })
    }

    /// Creates a client without establishing the connection; the transport
    /// connects on first use.
    ///
    /// # Errors
    ///
    /// [`ClientError::Connect`] when `addr` is not a valid endpoint.
    pub fn connect_lazy(addr: impl Into<String>) -> ClientResult<Self> {
        let channel = Endpoint::new(addr.into())?.connect_lazy();
        Ok(Self {
            flight: FlightServiceClient::new(channel),
        })
    }

    /// Creates a collection named `name` with the given Arrow schema.
    ///
    /// # Errors
    ///
    /// [`ClientError::Arrow`] if the schema cannot be IPC-encoded, or
    /// [`ClientError::Service`] if the store rejects the action.
    pub async fn create_collection(&mut self, name: &str, schema: &Schema) -> ClientResult<()> {
        let body = encode_create_collection(name, schema)?;
        let action = Action {
            r#type: CREATE_COLLECTION.to_owned(),
            body,
        };
        let mut results = self.flight.do_action(Request::new(action)).await?.into_inner();
        while results.message().await?.is_some() {}
        debug!(collection = name, "created collection");
        Ok(())
    }

    /// Runs a query ticket and returns the first record batch of the
    /// result stream.
    ///
    /// # Errors
    ///
    /// [`ClientError::NoData`] when the stream ends without a batch, or any
    /// transport/protocol error.
    pub async fn query(&mut self, ticket: impl Into<Bytes>) -> ClientResult<RecordBatch> {
        let request = Request::new(Ticket {
            ticket: ticket.into(),
        });
        let stream = self.flight.do_get(request).await?.into_inner();
        let mut batches =
            FlightRecordBatchStream::new_from_flight_data(stream.map_err(FlightError::from));
        let batch = batches.next().await.ok_or(ClientError::NoData)?;
        Ok(batch.map_err(Box::new)?)
    }

    /// Runs a query and decodes the result batch into `out`.
    ///
    /// # Errors
    ///
    /// Everything [`query`](Self::query) raises, plus
    /// [`ClientError::Decode`] when the batch does not fit `T`.
    pub async fn query_docs<T: Doc>(
        &mut self,
        reg: &Registry,
        ticket: impl Into<Bytes>,
        out: &mut DocSet<T>,
    ) -> ClientResult<()> {
        let batch = self.query(ticket).await?;
        debug!(rows = batch.num_rows(), "decoding query result");
        unmarshal_record(reg, &batch, out)?;
        Ok(())
    }

    /// Uploads one batch of documents into `collection`.
    ///
    /// The store acknowledges with a per-row error list; any rejected row
    /// fails the whole call with an aggregate [`ClientError::Upload`].
    ///
    /// # Errors
    ///
    /// [`ClientError::Upload`] when rows are rejected, [`ClientError::Ack`]
    /// on a malformed acknowledgement, or any transport/protocol error.
    pub async fn upload(&mut self, collection: &str, batch: RecordBatch) -> ClientResult<()> {
        let descriptor = FlightDescriptor::new_path(vec![collection.to_owned()]);
        let frames: Vec<FlightData> = FlightDataEncoderBuilder::new()
            .with_flight_descriptor(Some(descriptor))
            .build(stream::iter([Ok(batch)]))
            .try_collect()
            .await
            .map_err(Box::new)?;

        let mut acks = self.flight.do_put(stream::iter(frames)).await?.into_inner();
        while let Some(ack) = acks.message().await? {
            if ack.app_metadata.is_empty() {
                continue;
            }
            let row_errors: Vec<Option<String>> = serde_json::from_slice(&ack.app_metadata)?;
            if let Some(joined) = join_row_errors(&row_errors) {
                return Err(ClientError::Upload(joined));
            }
        }
        debug!(collection, "upload acknowledged");
        Ok(())
    }
}

/// Frames a create-collection action body: length-prefixed collection name
/// followed by the IPC-encoded schema.
fn encode_create_collection(name: &str, schema: &Schema) -> Result<Bytes, ClientError> {
    let IpcMessage(schema_bytes) =
        SchemaAsIpc::new(schema, &IpcWriteOptions::default()).try_into()?;
    let mut body = BytesMut::with_capacity(4 + name.len() + schema_bytes.len());
    body.put_u32_le(u32::try_from(name.len()).map_err(|_| {
        arrow_schema::ArrowError::InvalidArgumentError("collection name too long".to_owned())
    })?);
    body.put_slice(name.as_bytes());
    body.put_slice(&schema_bytes);
    Ok(body.freeze())
}

/// Collapses a per-row acknowledgement into one message, or `None` when
/// every row was accepted.
fn join_row_errors(rows: &[Option<String>]) -> Option<String> {
    let failures: Vec<String> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, err)| err.as_ref().map(|msg| format!("document[{i}]: {msg}")))
        .collect();
    if failures.is_empty() {
        None
    } else {
        Some(failures.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{DataType, Field};

    #[test]
    fn create_collection_body_framing() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, true)]);
        let body = encode_create_collection("traces", &schema).unwrap();

        let name_len = u32::from_le_bytes(body[..4].try_into().unwrap()) as usize;
        assert_eq!(name_len, 6);
        assert_eq!(&body[4..10], b"traces");
        // The remainder is the IPC schema message.
        assert!(body.len() > 10);
    }

    #[test]
    fn row_errors_join_in_order() {
        let rows = vec![
            None,
            Some("missing field".to_owned()),
            None,
            Some("bad type".to_owned()),
        ];
        assert_eq!(
            join_row_errors(&rows).unwrap(),
            "document[1]: missing field, document[3]: bad type"
        );
    }

    #[test]
    fn all_accepted_rows_join_to_none() {
        assert!(join_row_errors(&[None, None]).is_none());
        assert!(join_row_errors(&[]).is_none());
    }

    #[tokio::test]
    async fn lazy_client_surfaces_transport_errors() {
        // Port 1 refuses connections, so the first RPC on a lazily
        // connected channel fails with a service status.
        let mut client = Client::connect_lazy("http://127.0.0.1:1").unwrap();
        let err = client.query(Bytes::from_static(b"ticket")).await.unwrap_err();
        assert!(matches!(err, ClientError::Service(_)));
    }
}
