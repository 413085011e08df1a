// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! GraphQL documents sent to the subgraph

use super::PageRequest;
use ethers::types::Address;
use invoice_types::format_address;
use serde::Serialize;
use serde_json::{json, Value};

pub(crate) const INVOICE_DETAILS: &str = r#"
query GetInvoice($id: ID!) {
  invoice(id: $id) {
    id
    address
    network
    invoiceType
    createdAt
    creationTxHash
    client
    provider
    resolver
    clientReceiver
    providerReceiver
    token
    details
    amounts
    currentMilestone
    total
    released
    isLocked
    terminationTime
    deadline
    lateFee
    lateFeeTimeInterval
    fulfilled
    amountFulfilled
    verified { client }
    deposits(orderBy: timestamp, orderDirection: asc) { id txHash sender amount timestamp }
    withdraws(orderBy: timestamp, orderDirection: asc) { id txHash amount timestamp }
    releases(orderBy: timestamp, orderDirection: asc) { id txHash milestone amount timestamp }
    disputes(orderBy: timestamp, orderDirection: asc) {
      id txHash ipfsHash sender details disputeFee disputeId timestamp
    }
    resolutions(orderBy: timestamp, orderDirection: asc) {
      id txHash ipfsHash resolverType resolver clientAward providerAward resolutionFee timestamp
    }
    milestonesAdded(orderBy: timestamp, orderDirection: asc) { id txHash milestones timestamp }
    tipsMade(orderBy: timestamp, orderDirection: asc) { id txHash sender amount timestamp }
    tokenMetadata { id name symbol decimals totalSupply }
  }
}
"#;

pub(crate) const INVOICE_PAGE: &str = r#"
query GetInvoices(
  $where: Invoice_filter
  $first: Int!
  $skip: Int!
  $orderBy: Invoice_orderBy
  $orderDirection: OrderDirection
) {
  invoices(
    where: $where
    first: $first
    skip: $skip
    orderBy: $orderBy
    orderDirection: $orderDirection
  ) {
    id
    address
    network
    invoiceType
    createdAt
    client
    provider
    token
    amounts
    currentMilestone
    total
    released
    isLocked
    terminationTime
  }
}
"#;

pub(crate) const SYNC_STATUS: &str = r#"
query SyncStatus {
  _meta {
    block { number }
    hasIndexingErrors
  }
}
"#;

#[derive(Debug, Serialize)]
pub(crate) struct GraphQlRequest<'a> {
    pub query: &'a str,
    #[serde(rename = "operationName")]
    pub operation_name: &'a str,
    pub variables: Value,
}

pub(crate) fn invoice_details(address: Address) -> GraphQlRequest<'static> {
    GraphQlRequest {
        query: INVOICE_DETAILS,
        operation_name: "GetInvoice",
        variables: json!({ "id": format_address(&address) }),
    }
}

/// Invoices where `owner` is either party
pub(crate) fn invoice_page(owner: Address, page: &PageRequest) -> GraphQlRequest<'static> {
    let owner = format_address(&owner);
    GraphQlRequest {
        query: INVOICE_PAGE,
        operation_name: "GetInvoices",
        variables: json!({
            "where": { "or": [ { "client": owner }, { "provider": owner } ] },
            "first": page.page_size,
            "skip": page.skip(),
            "orderBy": page.order_by.as_str(),
            "orderDirection": page.direction.as_str(),
        }),
    }
}

pub(crate) fn sync_status() -> GraphQlRequest<'static> {
    GraphQlRequest {
        query: SYNC_STATUS,
        operation_name: "SyncStatus",
        variables: json!({}),
    }
}
